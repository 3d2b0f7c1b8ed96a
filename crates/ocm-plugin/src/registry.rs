//! The capability registry.
//!
//! A [`CapabilityRegistry`] resolves a typed specification to a handler for
//! one capability. In-process handlers win; otherwise the external plugin
//! registered for the type is started on first use and reused afterwards.

use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ocm_runtime::{Prototype, Scheme, Type, Typed};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::client::PluginClient;
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::process::Launcher;
use crate::shutdown::ShutdownCoordinator;
use crate::types::{PluginId, PluginLocation, PluginType};

/// Owner label used in errors for in-process handlers.
const INTERNAL: &str = "internal";

/// How long a plugin that finished starting after a shutdown gets to exit.
const LATE_START_GRACE: Duration = Duration::from_secs(5);

struct RunningPlugin<C: Capability> {
    location: PluginLocation,
    handler: Arc<C::Handler>,
}

struct RegistryState<C: Capability> {
    scheme: Scheme,
    internal: HashMap<Type, Arc<C::Handler>>,
    registered: HashMap<Type, Arc<PluginDescriptor>>,
    instances: HashMap<PluginId, Arc<OnceCell<RunningPlugin<C>>>>,
    /// Bumped by every shutdown; starts begun in an older generation are
    /// stopped instead of cached.
    generation: u64,
}

/// Resolves types to handlers for capability `C`.
///
/// The state mutex is only held for map access, never across a plugin start
/// or an RPC. Each plugin ID starts at most once; concurrent callers wait
/// for the first start and share its result. A start still in flight when
/// the registry shuts down is stopped once it completes and reported as a
/// start failure.
pub struct CapabilityRegistry<C: Capability> {
    launcher: Arc<dyn Launcher>,
    state: Mutex<RegistryState<C>>,
    shutdown: ShutdownCoordinator,
}

impl<C: Capability> fmt::Debug for CapabilityRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CapabilityRegistry")
            .field("plugin_type", &C::PLUGIN_TYPE)
            .field("internal", &state.internal.keys().collect::<Vec<_>>())
            .field("registered", &state.registered.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<C: Capability> CapabilityRegistry<C> {
    /// Create a registry with its own copy of `scheme`.
    #[must_use]
    pub fn new(scheme: Scheme, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            state: Mutex::new(RegistryState {
                scheme,
                internal: HashMap::new(),
                registered: HashMap::new(),
                instances: HashMap::new(),
                generation: 0,
            }),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// The capability this registry serves.
    #[must_use]
    pub fn plugin_type(&self) -> PluginType {
        C::PLUGIN_TYPE
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolution_error(typ: Type, message: impl Into<String>) -> PluginError {
        PluginError::Resolution {
            plugin_type: C::PLUGIN_TYPE,
            typ,
            message: message.into(),
        }
    }

    /// The handler for a typed specification.
    ///
    /// An empty type tag is defaulted through the scheme. Aliases of the
    /// type are tried after the type itself.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Resolution`] if nothing serves the type and
    /// start errors if the external plugin fails to come up.
    pub async fn get_plugin<T: Typed>(&self, spec: &T) -> PluginResult<Arc<C::Handler>> {
        let (descriptor, cell, generation) = {
            let mut state = self.lock();
            let typ = state.scheme.resolve_type(spec).map_err(|e| {
                Self::resolution_error(spec.get_type().clone(), e.to_string())
            })?;
            let aliases = state.scheme.aliases(&typ);
            let candidates: Vec<&Type> = iter::once(&typ).chain(aliases.iter()).collect();

            if let Some(handler) = candidates.iter().find_map(|t| state.internal.get(*t)) {
                debug!(plugin_type = %C::PLUGIN_TYPE, typ = %typ, "Using internal handler");
                return Ok(Arc::clone(handler));
            }

            let descriptor = candidates
                .iter()
                .find_map(|t| state.registered.get(*t))
                .cloned()
                .ok_or_else(|| {
                    Self::resolution_error(
                        typ.clone(),
                        "no internal handler or external plugin is registered",
                    )
                })?;
            let cell = Arc::clone(state.instances.entry(descriptor.id.clone()).or_default());
            (descriptor, cell, state.generation)
        };

        let running = cell.get_or_try_init(|| self.start(&descriptor, generation)).await?;
        Ok(Arc::clone(&running.handler))
    }

    async fn start(
        &self,
        descriptor: &PluginDescriptor,
        generation: u64,
    ) -> PluginResult<RunningPlugin<C>> {
        let started = self.launcher.start(descriptor, C::PLUGIN_TYPE).await?;
        // Checked and tracked under the state lock so a concurrent shutdown
        // either drains this process or sees a newer generation.
        let current = {
            let state = self.lock();
            let current = state.generation == generation;
            if current {
                self.shutdown.track(Arc::clone(&started.process));
            }
            current
        };
        if !current {
            let id = &descriptor.id;
            warn!(plugin_id = %id, "Registry shut down during start, stopping plugin");
            let late = ShutdownCoordinator::new();
            late.track(started.process);
            if let Err(e) = late.shutdown_with_timeout(LATE_START_GRACE).await {
                warn!(plugin_id = %id, error = %e, "Late plugin did not stop cleanly");
            }
            return Err(PluginError::Start {
                plugin_id: id.clone(),
                message: "registry shut down while the plugin was starting".into(),
            });
        }

        let client = PluginClient::new(descriptor.id.clone(), started.transport)
            .with_schemas(descriptor.schemas_for(C::PLUGIN_TYPE));
        info!(
            plugin_id = %descriptor.id,
            plugin_type = %C::PLUGIN_TYPE,
            location = %started.location,
            "Connected to plugin"
        );
        Ok(RunningPlugin {
            location: started.location,
            handler: C::connect(client),
        })
    }

    /// Bind a type to an external plugin.
    ///
    /// Re-adding a type for the same plugin ID is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyRegistered`] if the type is bound to an
    /// internal handler or to another plugin.
    pub fn add_plugin(&self, descriptor: Arc<PluginDescriptor>, typ: Type) -> PluginResult<()> {
        let mut state = self.lock();
        if state.internal.contains_key(&typ) {
            return Err(PluginError::AlreadyRegistered {
                plugin_type: C::PLUGIN_TYPE,
                typ,
                existing: INTERNAL.into(),
            });
        }
        if let Some(existing) = state.registered.get(&typ) {
            if existing.id == descriptor.id {
                return Ok(());
            }
            return Err(PluginError::AlreadyRegistered {
                plugin_type: C::PLUGIN_TYPE,
                typ,
                existing: existing.id.to_string(),
            });
        }

        debug!(
            plugin_type = %C::PLUGIN_TYPE,
            typ = %typ,
            plugin_id = %descriptor.id,
            "Registered external plugin"
        );
        state.registered.insert(typ, descriptor);
        Ok(())
    }

    /// Bind every type of prototype `T` in `scheme` to an in-process handler
    /// and teach the registry's scheme about `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registration`] if `T` is not in `scheme` and
    /// [`PluginError::AlreadyRegistered`] if any type is already bound.
    pub fn register_internal<T: Prototype>(
        &self,
        scheme: &Scheme,
        handler: Arc<C::Handler>,
    ) -> PluginResult<()> {
        self.insert_internal::<T>(scheme, handler, true)
    }

    /// Like [`register_internal`](Self::register_internal) but allows types
    /// that are also bound to an external plugin. The internal handler wins.
    ///
    /// # Errors
    ///
    /// See [`register_internal`](Self::register_internal).
    pub fn register_internal_unchecked<T: Prototype>(
        &self,
        scheme: &Scheme,
        handler: Arc<C::Handler>,
    ) -> PluginResult<()> {
        self.insert_internal::<T>(scheme, handler, false)
    }

    fn insert_internal<T: Prototype>(
        &self,
        scheme: &Scheme,
        handler: Arc<C::Handler>,
        check_external: bool,
    ) -> PluginResult<()> {
        let types = scheme.types_for::<T>().map_err(|e| PluginError::Registration {
            plugin_type: C::PLUGIN_TYPE,
            message: e.to_string(),
        })?;

        let mut state = self.lock();
        for typ in types {
            if state.internal.contains_key(typ) {
                return Err(PluginError::AlreadyRegistered {
                    plugin_type: C::PLUGIN_TYPE,
                    typ: typ.clone(),
                    existing: INTERNAL.into(),
                });
            }
            if check_external && let Some(existing) = state.registered.get(typ) {
                return Err(PluginError::AlreadyRegistered {
                    plugin_type: C::PLUGIN_TYPE,
                    typ: typ.clone(),
                    existing: existing.id.to_string(),
                });
            }
        }

        state
            .scheme
            .register_with_alias::<T>(types.iter().cloned())
            .map_err(|e| PluginError::Registration {
                plugin_type: C::PLUGIN_TYPE,
                message: e.to_string(),
            })?;
        for typ in types {
            debug!(plugin_type = %C::PLUGIN_TYPE, typ = %typ, "Registered internal handler");
            state.internal.insert(typ.clone(), Arc::clone(&handler));
        }
        Ok(())
    }

    /// Types bound to external plugins.
    #[must_use]
    pub fn registered_types(&self) -> Vec<Type> {
        let mut types: Vec<Type> = self.lock().registered.keys().cloned().collect();
        types.sort();
        types
    }

    /// Plugins that have been started, with their locations.
    #[must_use]
    pub fn running_plugins(&self) -> Vec<(PluginId, PluginLocation)> {
        let state = self.lock();
        let mut running: Vec<_> = state
            .instances
            .iter()
            .filter_map(|(id, cell)| cell.get().map(|r| (id.clone(), r.location.clone())))
            .collect();
        running.sort_by(|a, b| a.0.cmp(&b.0));
        running
    }

    /// Stop every plugin this registry started.
    ///
    /// Cached instances are dropped so a later `get_plugin` starts afresh.
    /// Starts still in flight are stopped when they complete.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Shutdown`] if any plugin failed to stop cleanly.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> PluginResult<()> {
        self.begin_shutdown();
        self.shutdown.shutdown(cancel).await
    }

    /// [`shutdown`](Self::shutdown) with a deadline.
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> PluginResult<()> {
        self.begin_shutdown();
        self.shutdown.shutdown_with_timeout(timeout).await
    }

    fn begin_shutdown(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        state.instances.clear();
    }
}
