//! Telemetry errors.

use thiserror::Error;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level or a directive does not parse.
    #[error("invalid log configuration: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed.
    #[error("cannot install subscriber: {0}")]
    InitError(String),

    /// The log directory cannot be created.
    #[error("log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
