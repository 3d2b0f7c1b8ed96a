//! Server-side endpoints for plugin binaries.
//!
//! A plugin binary registers one wire-contract implementation per
//! capability it serves together with the prototype types it accepts, then
//! hands the [`Endpoints`] to [`run_plugin`]:
//!
//! ```rust,ignore
//! let endpoints = Endpoints::new(scheme).with_digest_processor::<LocalBlob>(Arc::new(Digester))?;
//! run_plugin(endpoints).await
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ocm_runtime::{Prototype, Scheme, Type};

use crate::capability::{ComponentListerContract, DigestProcessorContract, ResourcePluginContract};
use crate::error::{PluginError, PluginResult};
use crate::types::{Capabilities, PluginType, TypeSchema};
use crate::wire;

mod cli;
mod handlers;
mod serve;

pub use cli::{PluginCli, PluginCommand, run_plugin, run_plugin_with};
pub use handlers::ApiError;
pub use serve::BoundPlugin;

/// A capability handler plus the types it accepts.
struct Served<H: ?Sized> {
    handler: Arc<H>,
    types: Vec<Type>,
}

impl<H: ?Sized> Clone for Served<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            types: self.types.clone(),
        }
    }
}

impl<H: ?Sized> Served<H> {
    fn add(slot: &mut Option<Self>, handler: Arc<H>, types: &[Type]) {
        match slot {
            Some(served) => {
                served.handler = handler;
                for typ in types {
                    if !served.types.contains(typ) {
                        served.types.push(typ.clone());
                    }
                }
            },
            None => {
                *slot = Some(Self {
                    handler,
                    types: types.to_vec(),
                });
            },
        }
    }
}

/// The handler a router dispatches to.
#[derive(Clone)]
pub(crate) enum Handler {
    Resource(Arc<dyn ResourcePluginContract>),
    Digest(Arc<dyn DigestProcessorContract>),
    Lister(Arc<dyn ComponentListerContract>),
}

/// Capability handlers a plugin binary serves.
///
/// Each capability has at most one handler; registering another prototype
/// for the same capability adds its types and the latest handler serves
/// them all.
#[derive(Clone)]
pub struct Endpoints {
    scheme: Scheme,
    resource: Option<Served<dyn ResourcePluginContract>>,
    digest: Option<Served<dyn DigestProcessorContract>>,
    lister: Option<Served<dyn ComponentListerContract>>,
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints")
            .field("resource", &self.resource.as_ref().map(|s| &s.types))
            .field("digest", &self.digest.as_ref().map(|s| &s.types))
            .field("lister", &self.lister.as_ref().map(|s| &s.types))
            .finish_non_exhaustive()
    }
}

impl Endpoints {
    /// Create endpoints over the scheme that knows the served prototypes.
    #[must_use]
    pub fn new(scheme: Scheme) -> Self {
        Self {
            scheme,
            resource: None,
            digest: None,
            lister: None,
        }
    }

    /// The scheme payloads are decoded with.
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Serve resource repository requests for every type registered for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registration`] if `T` is not in the scheme.
    pub fn with_resource_repository<T: Prototype>(
        mut self,
        handler: Arc<dyn ResourcePluginContract>,
    ) -> PluginResult<Self> {
        let types = self.types_of::<T>(PluginType::ResourceRepository)?;
        Served::add(&mut self.resource, handler, &types);
        Ok(self)
    }

    /// Serve digest processor requests for every type registered for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registration`] if `T` is not in the scheme.
    pub fn with_digest_processor<T: Prototype>(
        mut self,
        handler: Arc<dyn DigestProcessorContract>,
    ) -> PluginResult<Self> {
        let types = self.types_of::<T>(PluginType::DigestProcessor)?;
        Served::add(&mut self.digest, handler, &types);
        Ok(self)
    }

    /// Serve component lister requests for every type registered for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registration`] if `T` is not in the scheme.
    pub fn with_component_lister<T: Prototype>(
        mut self,
        handler: Arc<dyn ComponentListerContract>,
    ) -> PluginResult<Self> {
        let types = self.types_of::<T>(PluginType::ComponentLister)?;
        Served::add(&mut self.lister, handler, &types);
        Ok(self)
    }

    fn types_of<T: Prototype>(&self, plugin_type: PluginType) -> PluginResult<Vec<Type>> {
        self.scheme
            .types_for::<T>()
            .map(<[Type]>::to_vec)
            .map_err(|e| PluginError::Registration {
                plugin_type,
                message: e.to_string(),
            })
    }

    /// Types served for one capability.
    #[must_use]
    pub fn served_types(&self, plugin_type: PluginType) -> &[Type] {
        let types = match plugin_type {
            PluginType::ResourceRepository => self.resource.as_ref().map(|s| &s.types),
            PluginType::DigestProcessor => self.digest.as_ref().map(|s| &s.types),
            PluginType::ComponentLister => self.lister.as_ref().map(|s| &s.types),
        };
        types.map(Vec::as_slice).unwrap_or_default()
    }

    /// The discovery document printed by `<plugin> capabilities`.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema cannot be generated for a served type.
    pub fn capabilities(&self) -> PluginResult<Capabilities> {
        let mut types = BTreeMap::new();
        for plugin_type in PluginType::ALL {
            let served = self.served_types(plugin_type);
            if served.is_empty() {
                continue;
            }
            let schemas = served
                .iter()
                .map(|typ| {
                    Ok(TypeSchema {
                        typ: typ.clone(),
                        json_schema: self.scheme.json_schema(typ)?,
                    })
                })
                .collect::<PluginResult<Vec<_>>>()?;
            types.insert(plugin_type, schemas);
        }
        Ok(Capabilities { types })
    }

    fn handler(&self, plugin_type: PluginType) -> Option<Handler> {
        match plugin_type {
            PluginType::ResourceRepository => self
                .resource
                .as_ref()
                .map(|s| Handler::Resource(Arc::clone(&s.handler))),
            PluginType::DigestProcessor => self
                .digest
                .as_ref()
                .map(|s| Handler::Digest(Arc::clone(&s.handler))),
            PluginType::ComponentLister => self
                .lister
                .as_ref()
                .map(|s| Handler::Lister(Arc::clone(&s.handler))),
        }
    }

    /// The HTTP router for one capability.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if no handler is registered for it.
    pub fn router(&self, plugin_type: PluginType) -> PluginResult<Router> {
        let handler = self.handler(plugin_type).ok_or_else(|| {
            PluginError::NotFound(format!("this plugin does not serve {plugin_type}"))
        })?;

        let state = Arc::new(handlers::ServeState {
            plugin_type,
            types: self.served_types(plugin_type).to_vec(),
            handler,
        });

        let router = Router::new()
            .route(wire::HEALTHZ, get(handlers::healthz))
            .route(wire::IDENTITY, post(handlers::identity));
        let router = match plugin_type {
            PluginType::ResourceRepository => router
                .route(wire::RESOURCE_GET, post(handlers::get_resource))
                .route(wire::RESOURCE_ADD, post(handlers::add_resource)),
            PluginType::DigestProcessor => {
                router.route(wire::DIGEST_PROCESS, post(handlers::process_digest))
            },
            PluginType::ComponentLister => {
                router.route(wire::COMPONENT_LIST, post(handlers::list_components))
            },
        };
        Ok(router.with_state(state))
    }
}
