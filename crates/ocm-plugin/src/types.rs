//! Core plugin types shared by host and plugin binaries.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ocm_runtime::Type;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

/// Unique, stable plugin identifier.
///
/// IDs are derived from the plugin binary's file name, e.g.
/// `"ocm-oci-plugin"`. They must be non-empty and contain only lowercase
/// alphanumeric characters and hyphens, which also keeps them safe to
/// embed in socket paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginId(String);

impl<'de> Deserialize<'de> for PluginId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginId {
    /// Create a new `PluginId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or contains invalid characters.
    pub fn new(id: impl Into<String>) -> PluginResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a `PluginId` without validation (for tests and internal use).
    #[must_use]
    pub fn from_static(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> PluginResult<()> {
        if id.is_empty() {
            return Err(PluginError::InvalidId("plugin id must not be empty".into()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(PluginError::InvalidId(format!(
                "plugin id may only contain lowercase letters, digits and hyphens, got: {id}"
            )));
        }
        if id.starts_with('-') || id.ends_with('-') {
            return Err(PluginError::InvalidId(format!(
                "plugin id must not start or end with a hyphen, got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The capability a plugin instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginType {
    /// Resource download/upload.
    ResourceRepository,
    /// Resource digest computation.
    DigestProcessor,
    /// Component listing.
    ComponentLister,
}

impl PluginType {
    /// All capabilities.
    pub const ALL: [PluginType; 3] = [
        Self::ResourceRepository,
        Self::DigestProcessor,
        Self::ComponentLister,
    ];

    /// The string used in launch configs and capability documents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourceRepository => "resourceRepository",
            Self::DigestProcessor => "digestProcessor",
            Self::ComponentLister => "componentLister",
        }
    }

    /// Short suffix used to build per-capability instance IDs.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::ResourceRepository => "resource",
            Self::DigestProcessor => "digest",
            Self::ComponentLister => "lister",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport a plugin listens on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Unix domain socket at `<socket_dir>/<id>-plugin.socket`.
    #[default]
    Socket,
    /// TCP on localhost; the plugin prints its address on stdout.
    Tcp,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket => f.write_str("socket"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// The configuration a plugin binary receives as `--config <json>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Instance ID; determines the socket path.
    pub id: String,
    /// Transport to listen on.
    #[serde(rename = "type")]
    pub connection: ConnectionType,
    /// Capability to serve.
    #[serde(rename = "pluginType")]
    pub plugin_type: PluginType,
    /// Directory for the socket file. Defaults to the system temp dir.
    #[serde(rename = "socketDir", default, skip_serializing_if = "Option::is_none")]
    pub socket_dir: Option<PathBuf>,
    /// Exit after this many seconds without requests.
    #[serde(rename = "idleTimeout", default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

impl LaunchConfig {
    /// Create a launch config.
    #[must_use]
    pub fn new(id: impl Into<String>, connection: ConnectionType, plugin_type: PluginType) -> Self {
        Self {
            id: id.into(),
            connection,
            plugin_type,
            socket_dir: None,
            idle_timeout_secs: None,
        }
    }

    /// Set the socket directory.
    #[must_use]
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = Some(dir.into());
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, secs: Option<u64>) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Parse the JSON passed on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> PluginResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PluginError::ConfigError(format!("invalid launch config: {e}")))
    }

    /// The socket path this instance listens on.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        let dir = self
            .socket_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        socket_path(&dir, &self.id)
    }
}

/// `<dir>/<id>-plugin.socket`.
#[must_use]
pub fn socket_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}-plugin.socket"))
}

/// Where a running plugin can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginLocation {
    /// Unix domain socket path.
    Socket(PathBuf),
    /// TCP address.
    Tcp(SocketAddr),
}

impl PluginLocation {
    /// Parse an address line printed by a TCP plugin: either `host:port` or
    /// `http://host:port`, surrounding whitespace ignored.
    #[must_use]
    pub fn parse_tcp_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let addr = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let addr = addr.strip_suffix('/').unwrap_or(addr);
        addr.parse().ok().map(Self::Tcp)
    }
}

impl fmt::Display for PluginLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// The JSON Schema advertised for one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    /// The advertised type.
    #[serde(rename = "type")]
    pub typ: Type,
    /// JSON Schema for payloads of that type.
    #[serde(rename = "jsonSchema", default)]
    pub json_schema: Value,
}

/// The discovery document printed by `<plugin> capabilities`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Advertised types per capability.
    #[serde(default)]
    pub types: BTreeMap<PluginType, Vec<TypeSchema>>,
}

impl Capabilities {
    /// Advertised types for one capability.
    #[must_use]
    pub fn types_for(&self, plugin_type: PluginType) -> &[TypeSchema] {
        self.types.get(&plugin_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether nothing is advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.values().all(Vec::is_empty)
    }
}
