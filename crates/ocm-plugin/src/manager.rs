//! The plugin manager: one registry per capability.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join3;
use ocm_runtime::Scheme;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capability::{DigestCapability, ListerCapability, ResourceCapability};
use crate::config::ManagerConfig;
use crate::descriptor::PluginDescriptor;
use crate::discovery::discover_plugins;
use crate::error::{PluginError, PluginResult};
use crate::process::{Launcher, ProcessLauncher};
use crate::registry::CapabilityRegistry;
use crate::types::PluginType;

/// Owns the capability registries and the shared launcher.
///
/// Build one at startup and pass it to whatever needs plugins; there is no
/// global instance.
#[derive(Debug)]
pub struct PluginManager {
    config: ManagerConfig,
    resources: CapabilityRegistry<ResourceCapability>,
    digests: CapabilityRegistry<DigestCapability>,
    listers: CapabilityRegistry<ListerCapability>,
}

impl PluginManager {
    /// Create a manager that launches plugin processes.
    #[must_use]
    pub fn new(config: ManagerConfig, scheme: &Scheme) -> Self {
        let launcher = Arc::new(ProcessLauncher::from_config(&config));
        Self::with_launcher(config, scheme, launcher)
    }

    /// Create a manager with a custom launcher.
    #[must_use]
    pub fn with_launcher(
        config: ManagerConfig,
        scheme: &Scheme,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            resources: CapabilityRegistry::new(scheme.clone(), Arc::clone(&launcher)),
            digests: CapabilityRegistry::new(scheme.clone(), Arc::clone(&launcher)),
            listers: CapabilityRegistry::new(scheme.clone(), launcher),
            config,
        }
    }

    /// The manager configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Resource repositories.
    #[must_use]
    pub fn resource_repositories(&self) -> &CapabilityRegistry<ResourceCapability> {
        &self.resources
    }

    /// Digest processors.
    #[must_use]
    pub fn digest_processors(&self) -> &CapabilityRegistry<DigestCapability> {
        &self.digests
    }

    /// Component listers.
    #[must_use]
    pub fn component_listers(&self) -> &CapabilityRegistry<ListerCapability> {
        &self.listers
    }

    /// Discover plugins from the configuration and register every type
    /// they advertise. Returns the number of plugins registered.
    ///
    /// Conflicting types are logged and skipped.
    pub async fn register_plugins(&self) -> usize {
        let descriptors = discover_plugins(&self.config).await;
        let mut registered = 0usize;
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            match self.register_descriptor(descriptor) {
                Ok(()) => registered = registered.saturating_add(1),
                Err(e) => warn!(plugin_id = %id, error = %e, "Failed to register plugin"),
            }
        }
        info!(count = registered, "Registered plugins");
        registered
    }

    /// Register every type a descriptor advertises with the matching
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns the first conflict. Every conflict is logged and the
    /// non-conflicting types stay registered.
    pub fn register_descriptor(&self, descriptor: PluginDescriptor) -> PluginResult<()> {
        let descriptor = Arc::new(descriptor);
        let mut first_error = None;
        for plugin_type in PluginType::ALL {
            for schema in descriptor.capabilities.types_for(plugin_type) {
                let typ = schema.typ.clone();
                let result = match plugin_type {
                    PluginType::ResourceRepository => {
                        self.resources.add_plugin(Arc::clone(&descriptor), typ)
                    },
                    PluginType::DigestProcessor => {
                        self.digests.add_plugin(Arc::clone(&descriptor), typ)
                    },
                    PluginType::ComponentLister => {
                        self.listers.add_plugin(Arc::clone(&descriptor), typ)
                    },
                };
                if let Err(e) = result {
                    warn!(
                        plugin_id = %descriptor.id,
                        plugin_type = %plugin_type,
                        error = %e,
                        "Type conflict"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every running plugin across all capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Shutdown`] joining every failure.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> PluginResult<()> {
        let (resources, digests, listers) = join3(
            self.resources.shutdown(cancel),
            self.digests.shutdown(cancel),
            self.listers.shutdown(cancel),
        )
        .await;
        PluginError::join(
            [resources, digests, listers]
                .into_iter()
                .filter_map(Result::err)
                .collect(),
        )
    }

    /// [`shutdown`](Self::shutdown) with a deadline; `None` uses the
    /// configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_with_timeout(&self, timeout: Option<Duration>) -> PluginResult<()> {
        let timeout = timeout.unwrap_or_else(|| self.config.shutdown_timeout());
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };
        let result = self.shutdown(&cancel).await;
        timer.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capabilities, PluginId, TypeSchema};
    use ocm_runtime::Type;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn descriptor(id: &str, types: &[(PluginType, &str)]) -> PluginDescriptor {
        let mut map: BTreeMap<PluginType, Vec<TypeSchema>> = BTreeMap::new();
        for (plugin_type, typ) in types {
            map.entry(*plugin_type).or_default().push(TypeSchema {
                typ: Type::parse(typ).unwrap(),
                json_schema: Value::Null,
            });
        }
        PluginDescriptor::new(
            PluginId::from_static(id),
            format!("/plugins/{id}"),
            Capabilities { types: map },
        )
    }

    #[test]
    fn test_register_descriptor_routes_by_capability() {
        let manager = PluginManager::new(ManagerConfig::default(), &Scheme::new());
        manager
            .register_descriptor(descriptor(
                "blob",
                &[
                    (PluginType::ResourceRepository, "localBlob/v1"),
                    (PluginType::DigestProcessor, "localBlob/v1"),
                    (PluginType::ComponentLister, "CommonTransportFormat/v1"),
                ],
            ))
            .unwrap();

        assert_eq!(
            manager.resource_repositories().registered_types(),
            vec![Type::versioned("localBlob", "v1")]
        );
        assert_eq!(manager.digest_processors().registered_types().len(), 1);
        assert_eq!(
            manager.component_listers().registered_types(),
            vec![Type::versioned("CommonTransportFormat", "v1")]
        );
    }

    #[test]
    fn test_conflicts_keep_other_types() {
        let manager = PluginManager::new(ManagerConfig::default(), &Scheme::new());
        manager
            .register_descriptor(descriptor("first", &[(PluginType::ResourceRepository, "a/v1")]))
            .unwrap();

        let err = manager
            .register_descriptor(descriptor(
                "second",
                &[
                    (PluginType::ResourceRepository, "a/v1"),
                    (PluginType::ResourceRepository, "b/v1"),
                ],
            ))
            .unwrap_err();
        assert!(matches!(err, PluginError::AlreadyRegistered { .. }));
        assert_eq!(manager.resource_repositories().registered_types().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_without_plugins() {
        let manager = PluginManager::new(ManagerConfig::default(), &Scheme::new());
        assert!(manager.shutdown_with_timeout(Some(Duration::from_secs(1))).await.is_ok());
    }
}
