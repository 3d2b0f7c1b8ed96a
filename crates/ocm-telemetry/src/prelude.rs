//! Commonly used types.
//!
//! ```rust,no_run
//! use ocm_telemetry::prelude::*;
//!
//! # fn main() -> TelemetryResult<()> {
//! let level = level_from_env(HOST_LOG_ENV, "info");
//! setup_logging(&LogConfig::new(level).with_format(LogFormat::Json))?;
//! # Ok(())
//! # }
//! ```

pub use crate::{TelemetryError, TelemetryResult};

pub use crate::{HOST_LOG_ENV, LogConfig, LogFormat, LogTarget, PLUGIN_LOG_ENV};

pub use crate::{level_from_env, setup_logging};

pub use crate::{REQUEST_ID_HEADER, RequestContext};
