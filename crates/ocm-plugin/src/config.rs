//! Plugin manager configuration.
//!
//! Hosts typically load this from a TOML file such as `plugins.toml`:
//!
//! ```toml
//! plugin_dirs = ["/usr/lib/ocm/plugins"]
//! connection = "socket"
//! idle_timeout_secs = 300
//!
//! [handshake]
//! timeout_secs = 10
//!
//! [plugins.oci]
//! command = "ocm-oci-plugin"
//! binary_hash = "sha256:..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::types::ConnectionType;

/// Readiness handshake tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Overall deadline for a plugin to become ready.
    pub timeout_secs: u64,
    /// How many times to look for the socket file.
    pub poll_attempts: u32,
    /// Delay after the first failed poll.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling poll delay.
    pub max_backoff_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            poll_attempts: 20,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl HandshakeConfig {
    /// Overall handshake deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay after the first failed poll.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Upper bound for the poll delay.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// A plugin configured by command rather than found in a plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Command name or path; bare names are resolved through `PATH`.
    pub command: String,
    /// Transport override for this plugin.
    #[serde(default)]
    pub connection: Option<ConnectionType>,
    /// Expected binary hash (`sha256:<hex>`).
    #[serde(default)]
    pub binary_hash: Option<String>,
}

impl PluginEntry {
    /// A plugin entry for a command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            connection: None,
            binary_hash: None,
        }
    }

    /// Require the binary to match a hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.binary_hash = Some(hash.into());
        self
    }
}

/// Configuration for a [`PluginManager`](crate::PluginManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directories scanned for plugin binaries.
    pub plugin_dirs: Vec<PathBuf>,
    /// Transport requested from plugins.
    pub connection: ConnectionType,
    /// Directory holding plugin sockets.
    pub socket_dir: PathBuf,
    /// Forwarded to plugins; they exit after this long without requests.
    pub idle_timeout_secs: Option<u64>,
    /// Deadline for `<plugin> capabilities` during discovery.
    pub discovery_timeout_secs: u64,
    /// Default deadline for graceful shutdown before plugins are killed.
    pub shutdown_timeout_secs: u64,
    /// Readiness handshake tuning.
    pub handshake: HandshakeConfig,
    /// Plugins configured by command, keyed by plugin ID.
    pub plugins: BTreeMap<String, PluginEntry>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: Vec::new(),
            connection: ConnectionType::default(),
            socket_dir: std::env::temp_dir(),
            idle_timeout_secs: None,
            discovery_timeout_secs: 5,
            shutdown_timeout_secs: 10,
            handshake: HandshakeConfig::default(),
            plugins: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| PluginError::ConfigError(format!("Invalid config: {e}")))
    }

    /// Load configuration if the file exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> PluginResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save(&self, path: impl AsRef<Path>) -> PluginResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PluginError::ConfigError(format!("Cannot serialize config: {e}")))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add a plugin directory.
    #[must_use]
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(dir.into());
        self
    }

    /// Add a plugin configured by command.
    #[must_use]
    pub fn with_plugin(mut self, id: impl Into<String>, entry: PluginEntry) -> Self {
        self.plugins.insert(id.into(), entry);
        self
    }

    /// Set the transport requested from plugins.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionType) -> Self {
        self.connection = connection;
        self
    }

    /// Set the socket directory.
    #[must_use]
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    /// Set the plugin idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Set the handshake tuning.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Deadline for `<plugin> capabilities`.
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Default graceful shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
