//! Capability contracts.
//!
//! Every capability comes in two shapes:
//!
//! - a **wire contract** (`*Contract`) speaking the JSON DTOs of
//!   [`crate::wire`]. Plugin binaries implement it and serve it through
//!   [`Endpoints`](crate::Endpoints); the host reaches it through a client
//!   stub that validates typed payloads before sending.
//! - a **canonical** trait ([`ResourceRepository`], [`DigestProcessor`],
//!   [`ComponentLister`]) in the shapes of [`ocm_runtime::descriptor`].
//!   Callers use it, and in-process handlers implement it directly.
//!
//! A converter adapter turns any wire contract into the canonical trait.
//! [`Capability`] ties the pieces together so the registry is written once.

use std::sync::Arc;

use crate::client::PluginClient;
use crate::types::PluginType;

pub mod digest;
pub mod lister;
pub mod resource;

pub use digest::{
    DigestCapability, DigestPluginClient, DigestProcessor, DigestProcessorContract,
    DigestProcessorConverter,
};
pub use lister::{
    ComponentLister, ComponentListerContract, ListerCapability, ListerPluginClient,
    ListerPluginConverter,
};
pub use resource::{
    ResourceCapability, ResourcePluginClient, ResourcePluginContract, ResourcePluginConverter,
    ResourceRepository,
};

/// A family of operations served by internal handlers or external plugins.
pub trait Capability: Send + Sync + 'static {
    /// The canonical handler trait object, e.g. `dyn ResourceRepository`.
    type Handler: ?Sized + Send + Sync + 'static;

    /// The tag used in launch configs and capability documents.
    const PLUGIN_TYPE: PluginType;

    /// Wrap an RPC client to a running plugin into a canonical handler.
    fn connect(client: PluginClient) -> Arc<Self::Handler>;
}
