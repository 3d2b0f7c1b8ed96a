//! Plugin error types.

use std::path::PathBuf;
use std::time::Duration;

use ocm_runtime::{SchemeError, Type};

use crate::types::{PluginId, PluginType};

/// Errors from registry, process, RPC and endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A registration call was rejected (e.g. prototype missing from the scheme).
    #[error("registration failed for {plugin_type}: {message}")]
    Registration {
        /// Capability being registered for.
        plugin_type: PluginType,
        /// Failure reason.
        message: String,
    },

    /// The type is already bound for this capability.
    #[error("type {typ} is already registered for {plugin_type} by {existing}")]
    AlreadyRegistered {
        /// Capability the type is bound for.
        plugin_type: PluginType,
        /// The contested type.
        typ: Type,
        /// Owner of the existing binding (plugin ID or `internal`).
        existing: String,
    },

    /// No internal handler or external plugin serves the type.
    #[error("cannot resolve {plugin_type} plugin for type {typ}: {message}")]
    Resolution {
        /// Capability requested.
        plugin_type: PluginType,
        /// Requested type (possibly empty).
        typ: Type,
        /// Failure reason.
        message: String,
    },

    /// The plugin binary could not be started or failed its handshake.
    #[error("failed to start plugin {plugin_id}: {message}")]
    Start {
        /// The plugin being started.
        plugin_id: PluginId,
        /// Failure reason.
        message: String,
    },

    /// The plugin did not become ready in time.
    #[error("plugin {plugin_id} did not become ready within {timeout:?}")]
    HandshakeTimeout {
        /// The plugin being started.
        plugin_id: PluginId,
        /// The configured handshake deadline.
        timeout: Duration,
    },

    /// A typed payload failed the plugin's advertised schema.
    #[error("{typ} payload rejected by schema of plugin {plugin_id}: {}", .errors.join("; "))]
    Validation {
        /// Plugin whose schema rejected the payload.
        plugin_id: PluginId,
        /// Payload type.
        typ: Type,
        /// Individual schema violations.
        errors: Vec<String>,
    },

    /// The plugin answered with a non-2xx status and an unstructured body.
    #[error("plugin {plugin_id} returned {status} for {operation}: {body}")]
    Protocol {
        /// The plugin called.
        plugin_id: PluginId,
        /// RPC path.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The plugin reported a structured failure.
    #[error("plugin {plugin_id} failed {operation} ({status}): {message}")]
    Application {
        /// The plugin called.
        plugin_id: PluginId,
        /// RPC path.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Message reported by the plugin.
        message: String,
    },

    /// A plugin handler refused a request. Raised by plugin binaries; the
    /// endpoints turn it into an error response with the given status.
    #[error("{message}")]
    Rejected {
        /// HTTP status code to answer with.
        status: u16,
        /// Message for the caller.
        message: String,
    },

    /// The connection to a plugin failed.
    #[error("transport error talking to {location}: {message}")]
    Transport {
        /// Socket path or address.
        location: String,
        /// Failure reason.
        message: String,
    },

    /// One or more plugins failed to shut down cleanly.
    #[error("plugin shutdown failed: {}", join_errors(.0))]
    Shutdown(Vec<PluginError>),

    /// Signal delivery or process reaping failed.
    #[error("process error for plugin {plugin_id}: {message}")]
    Process {
        /// The affected plugin.
        plugin_id: PluginId,
        /// Failure reason.
        message: String,
    },

    /// Type scheme error.
    #[error(transparent)]
    Scheme(#[from] SchemeError),

    /// Converting between canonical and wire shapes failed.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Invalid manager or launch configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A plugin binary could not be described.
    #[error("discovery failed for {path}: {message}")]
    Discovery {
        /// The binary being queried.
        path: PathBuf,
        /// Failure reason.
        message: String,
    },

    /// A requested endpoint or capability is not served.
    #[error("not found: {0}")]
    NotFound(String),

    /// The plugin ID is invalid.
    #[error("invalid plugin id: {0}")]
    InvalidId(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[PluginError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PluginError {
    /// A refusal with the given HTTP status, for use in plugin handlers.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Join a list of errors: `Ok` if empty, the error itself if there is
    /// one, [`PluginError::Shutdown`] otherwise. Nested shutdown errors are
    /// flattened.
    pub(crate) fn join(errors: Vec<PluginError>) -> PluginResult<()> {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Self::Shutdown(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.is_empty() {
            Ok(())
        } else {
            Err(Self::Shutdown(flat))
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_flattens() {
        let id = PluginId::from_static("a");
        let nested = PluginError::Shutdown(vec![PluginError::Process {
            plugin_id: id.clone(),
            message: "one".into(),
        }]);
        let other = PluginError::Process {
            plugin_id: id,
            message: "two".into(),
        };

        let Err(PluginError::Shutdown(errors)) = PluginError::join(vec![nested, other]) else {
            panic!("expected joined error");
        };
        assert_eq!(errors.len(), 2);
        assert!(PluginError::join(Vec::new()).is_ok());
    }

    #[test]
    fn test_shutdown_display_lists_every_error() {
        let err = PluginError::Shutdown(vec![
            PluginError::ConfigError("first".into()),
            PluginError::ConfigError("second".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }
}
