//! Commonly used types.
//!
//! ```rust,ignore
//! use ocm_plugin::prelude::*;
//!
//! let endpoints = Endpoints::new(scheme).with_resource_repository::<Blob>(Arc::new(Store))?;
//! run_plugin(endpoints).await?;
//! ```

pub use crate::{PluginError, PluginResult};

pub use crate::{ManagerConfig, PluginManager};

pub use crate::{CapabilityRegistry, PluginId, PluginType};

pub use crate::capability::{
    ComponentLister, ComponentListerContract, DigestProcessor, DigestProcessorContract,
    ResourcePluginContract, ResourceRepository,
};

pub use crate::{Endpoints, run_plugin};
