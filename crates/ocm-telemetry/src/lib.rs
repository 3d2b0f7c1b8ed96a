//! OCM telemetry - logging setup and request spans.
//!
//! This crate provides:
//! - Configurable logging for hosts and plugin binaries
//! - A request context whose ID follows a plugin call from host to plugin
//!
//! # Example
//!
//! ```rust,no_run
//! use ocm_telemetry::{LogConfig, PLUGIN_LOG_ENV, RequestContext, level_from_env, setup_logging};
//!
//! # fn main() -> Result<(), ocm_telemetry::TelemetryError> {
//! // Plugin binaries log to stderr so stdout stays free for the handshake.
//! let level = level_from_env(PLUGIN_LOG_ENV, "info");
//! setup_logging(&LogConfig::for_plugin(level).with_directive("ocm_plugin=debug"))?;
//!
//! let ctx = RequestContext::new("oci-plugin-resource", "/resource/get");
//! let _span = ctx.span().entered();
//! tracing::info!("Fetching resource");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{REQUEST_ID_HEADER, RequestContext};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    HOST_LOG_ENV, LogConfig, LogFormat, LogTarget, PLUGIN_LOG_ENV, level_from_env, setup_logging,
};
