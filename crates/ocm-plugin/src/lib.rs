//! OCM plugin - typed capability registries and the plugin RPC framework.
//!
//! This crate provides:
//! - Capability contracts for resource repositories, digest processors and
//!   component listers, in wire and canonical shapes
//! - [`CapabilityRegistry`]: resolves a typed payload to an internal handler
//!   or a lazily started external plugin
//! - A process manager that launches plugin binaries and performs the
//!   socket or TCP handshake
//! - [`PluginClient`] and [`HttpTransport`]: JSON over HTTP/1.1 to a running
//!   plugin, with schema validation before any request is sent
//! - [`Endpoints`]: the server side, for writing plugin binaries
//! - [`ShutdownCoordinator`] and [`PluginManager`] to tie it together
//!
//! # Example
//!
//! ```rust,no_run
//! use ocm_plugin::capability::ResourceRepository;
//! use ocm_plugin::{ManagerConfig, PluginManager};
//! use ocm_runtime::{Raw, Scheme};
//!
//! # async fn example() -> ocm_plugin::PluginResult<()> {
//! let config = ManagerConfig::load_or_default("ocm-plugins.toml")?;
//! let manager = PluginManager::new(config, &Scheme::with_unknown_allowed());
//! manager.register_plugins().await;
//!
//! let access: Raw =
//!     serde_json::from_str(r#"{"type":"OCIImage/v1","imageReference":"ghcr.io/acme/app:1.0"}"#)?;
//! let repository = manager.resource_repositories().get_plugin(&access).await?;
//! let identity = repository.resource_identity(&access).await?;
//! println!("{identity:?}");
//!
//! manager.shutdown_with_timeout(None).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod capability;
pub mod convert;
pub mod discovery;
pub mod paginate;
pub mod prelude;
pub mod process;
#[allow(missing_docs)]
pub mod wire;

mod client;
mod config;
mod descriptor;
mod endpoints;
mod error;
mod manager;
mod registry;
mod schema;
mod shutdown;
mod transport;
mod types;

pub use client::PluginClient;
pub use config::{HandshakeConfig, ManagerConfig, PluginEntry};
pub use descriptor::{PluginDescriptor, hash_file};
pub use endpoints::{
    ApiError, BoundPlugin, Endpoints, PluginCli, PluginCommand, run_plugin, run_plugin_with,
};
pub use error::{PluginError, PluginResult};
pub use manager::PluginManager;
pub use registry::CapabilityRegistry;
pub use schema::SchemaValidator;
pub use shutdown::ShutdownCoordinator;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
pub use types::{
    Capabilities, ConnectionType, LaunchConfig, PluginId, PluginLocation, PluginType, TypeSchema,
    socket_path,
};
