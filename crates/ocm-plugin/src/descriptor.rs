//! Discovery-time plugin descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ocm_runtime::Type;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{PluginError, PluginResult};
use crate::types::{Capabilities, ConnectionType, PluginId, PluginType};

/// Static description of an external plugin binary, built once during
/// discovery and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Unique plugin ID.
    pub id: PluginId,
    /// Path to the binary.
    pub path: PathBuf,
    /// Transport to request when launching.
    pub connection: ConnectionType,
    /// Advertised types and their schemas, per capability.
    pub capabilities: Capabilities,
    /// Expected binary hash (`sha256:<hex>`), checked before every launch.
    pub binary_hash: Option<String>,
}

impl PluginDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(id: PluginId, path: impl Into<PathBuf>, capabilities: Capabilities) -> Self {
        Self {
            id,
            path: path.into(),
            connection: ConnectionType::default(),
            capabilities,
            binary_hash: None,
        }
    }

    /// Set the transport.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionType) -> Self {
        self.connection = connection;
        self
    }

    /// Require the binary to match a hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.binary_hash = Some(hash.into());
        self
    }

    /// Advertised schemas for one capability, keyed by type.
    #[must_use]
    pub fn schemas_for(&self, plugin_type: PluginType) -> HashMap<Type, Value> {
        self.capabilities
            .types_for(plugin_type)
            .iter()
            .filter(|schema| !schema.json_schema.is_null())
            .map(|schema| (schema.typ.clone(), schema.json_schema.clone()))
            .collect()
    }

    /// Verify the binary hash if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Start`] if the binary cannot be read or the
    /// hash does not match.
    pub async fn verify_binary(&self) -> PluginResult<()> {
        let Some(expected) = &self.binary_hash else {
            return Ok(());
        };

        let actual = hash_file(&self.path).await.map_err(|e| PluginError::Start {
            plugin_id: self.id.clone(),
            message: format!("cannot hash {}: {e}", self.path.display()),
        })?;
        if expected != &actual {
            return Err(PluginError::Start {
                plugin_id: self.id.clone(),
                message: format!("Binary hash mismatch: expected {expected}, got {actual}"),
            });
        }
        Ok(())
    }
}

/// `sha256:<hex>` of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn hash_file(path: &Path) -> PluginResult<String> {
    let data = tokio::fs::read(path).await?;
    Ok(format!("sha256:{}", hex::encode(Sha256::digest(&data))))
}
