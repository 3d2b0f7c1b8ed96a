//! Plugin process management.
//!
//! [`ProcessLauncher`] spawns a plugin binary with its launch config, waits
//! for it to become ready and hands back a transport plus a process handle.
//! The registry only sees the [`Launcher`] trait.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::client::PluginClient;
use crate::config::{HandshakeConfig, ManagerConfig};
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ConnectionType, LaunchConfig, PluginId, PluginLocation, PluginType};

mod child;
mod handshake;
mod logs;

pub use child::{ChildProcess, ManagedProcess, ProcessExit};

/// A plugin that passed its readiness handshake.
#[derive(Clone)]
pub struct StartedPlugin {
    /// Where the plugin listens.
    pub location: PluginLocation,
    /// Transport to the plugin.
    pub transport: Arc<dyn Transport>,
    /// Handle for shutdown.
    pub process: Arc<dyn ManagedProcess>,
}

impl fmt::Debug for StartedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartedPlugin")
            .field("location", &self.location)
            .field("plugin_id", self.process.plugin_id())
            .finish_non_exhaustive()
    }
}

/// Starts plugin instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start `descriptor` serving `plugin_type` and wait until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Start`] or [`PluginError::HandshakeTimeout`];
    /// no process is left running on failure.
    async fn start(
        &self,
        descriptor: &PluginDescriptor,
        plugin_type: PluginType,
    ) -> PluginResult<StartedPlugin>;
}

/// Launches plugin binaries as child processes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    socket_dir: PathBuf,
    idle_timeout_secs: Option<u64>,
    handshake: HandshakeConfig,
}

impl ProcessLauncher {
    /// Launcher settings from the manager config.
    #[must_use]
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            socket_dir: config.socket_dir.clone(),
            idle_timeout_secs: config.idle_timeout_secs,
            handshake: config.handshake.clone(),
        }
    }

    /// The launch config for one capability of a plugin. Each capability
    /// runs as its own instance with its own socket.
    #[must_use]
    pub fn launch_config(
        &self,
        descriptor: &PluginDescriptor,
        plugin_type: PluginType,
    ) -> LaunchConfig {
        LaunchConfig::new(
            format!("{}-{}", descriptor.id, plugin_type.slug()),
            descriptor.connection,
            plugin_type,
        )
        .with_socket_dir(&self.socket_dir)
        .with_idle_timeout(self.idle_timeout_secs)
    }

    fn start_error(id: &PluginId, message: impl Into<String>) -> PluginError {
        PluginError::Start {
            plugin_id: id.clone(),
            message: message.into(),
        }
    }

    async fn handshake(
        &self,
        descriptor: &PluginDescriptor,
        launch: &LaunchConfig,
        process: &ChildProcess,
        stdout: Option<tokio::process::ChildStdout>,
    ) -> PluginResult<PluginLocation> {
        let id = &descriptor.id;
        let location = match launch.connection {
            ConnectionType::Socket => {
                if let Some(stdout) = stdout {
                    logs::spawn_forwarder(id.clone(), "stdout", BufReader::new(stdout).lines());
                }
                handshake::wait_for_socket(id, &launch.socket_path(), &self.handshake, process)
                    .await?
            },
            ConnectionType::Tcp => {
                let stdout = stdout.ok_or_else(|| Self::start_error(id, "stdout is not captured"))?;
                let mut lines = BufReader::new(stdout).lines();
                let location = handshake::read_tcp_address(id, &mut lines).await?;
                logs::spawn_forwarder(id.clone(), "stdout", lines);
                location
            },
        };

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(location.clone()));
        PluginClient::new(id.clone(), transport).ping().await?;
        Ok(location)
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn start(
        &self,
        descriptor: &PluginDescriptor,
        plugin_type: PluginType,
    ) -> PluginResult<StartedPlugin> {
        let id = &descriptor.id;

        // 1. Verify binary hash if configured
        descriptor.verify_binary().await?;

        // 2. Build the launch config
        let launch = self.launch_config(descriptor, plugin_type);
        let config_json = serde_json::to_string(&launch)?;
        if launch.connection == ConnectionType::Socket {
            let socket = launch.socket_path();
            if let Err(e) = tokio::fs::remove_file(&socket).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(
                    plugin_id = %id,
                    path = %socket.display(),
                    error = %e,
                    "Failed to remove stale socket"
                );
            }
        }

        // 3. Spawn
        debug!(
            plugin_id = %id,
            path = %descriptor.path.display(),
            config = %config_json,
            "Starting plugin"
        );
        let mut child = Command::new(&descriptor.path)
            .arg("--config")
            .arg(&config_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let path = descriptor.path.display();
                Self::start_error(id, format!("failed to spawn {path}: {e}"))
            })?;

        if let Some(stderr) = child.stderr.take() {
            logs::spawn_forwarder(id.clone(), "stderr", BufReader::new(stderr).lines());
        }
        let stdout = child.stdout.take();
        let process = ChildProcess::spawn(id.clone(), child);

        // 4. Handshake
        let timeout = self.handshake.timeout();
        let handshake = self.handshake(descriptor, &launch, &process, stdout);
        let location = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(location)) => location,
            Ok(Err(e)) => {
                process.kill();
                return Err(e);
            },
            Err(_) => {
                process.kill();
                return Err(PluginError::HandshakeTimeout {
                    plugin_id: id.clone(),
                    timeout,
                });
            },
        };

        info!(
            plugin_id = %id,
            plugin_type = %plugin_type,
            location = %location,
            pid = ?process.pid(),
            "Plugin started"
        );

        Ok(StartedPlugin {
            transport: Arc::new(HttpTransport::new(location.clone())),
            location,
            process: Arc::new(process),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capabilities;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("fake-plugin");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn launcher(dir: &std::path::Path) -> ProcessLauncher {
        let config = ManagerConfig::default()
            .with_socket_dir(dir)
            .with_idle_timeout(30)
            .with_handshake(HandshakeConfig {
                timeout_secs: 2,
                poll_attempts: 10,
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
            });
        ProcessLauncher::from_config(&config)
    }

    #[test]
    fn test_launch_config_per_capability() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = PluginDescriptor::new(
            PluginId::from_static("oci"),
            "/bin/oci",
            Capabilities::default(),
        )
        .with_connection(ConnectionType::Tcp);

        let launch = launcher(dir.path()).launch_config(&descriptor, PluginType::DigestProcessor);
        assert_eq!(launch.id, "oci-digest");
        assert_eq!(launch.connection, ConnectionType::Tcp);
        assert_eq!(launch.idle_timeout_secs, Some(30));
        assert_eq!(launch.socket_path(), dir.path().join("oci-digest-plugin.socket"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = PluginDescriptor::new(
            PluginId::from_static("ghost"),
            dir.path().join("does-not-exist"),
            Capabilities::default(),
        );
        let err = launcher(dir.path())
            .start(&descriptor, PluginType::ResourceRepository)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Start { .. }));
    }

    #[tokio::test]
    async fn test_missing_pinned_binary_is_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = PluginDescriptor::new(
            PluginId::from_static("pinned"),
            dir.path().join("does-not-exist"),
            Capabilities::default(),
        )
        .with_hash("sha256:00");
        let err = launcher(dir.path())
            .start(&descriptor, PluginType::ResourceRepository)
            .await
            .unwrap_err();
        let PluginError::Start { plugin_id, .. } = err else {
            panic!("expected start error, got {err}");
        };
        assert_eq!(plugin_id.as_str(), "pinned");
    }

    #[tokio::test]
    async fn test_early_exit_fails_socket_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo crashing >&2\nexit 3");
        let descriptor =
            PluginDescriptor::new(PluginId::from_static("crash"), path, Capabilities::default());

        let err = launcher(dir.path())
            .start(&descriptor, PluginType::ResourceRepository)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Start { .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_tcp_eof_fails_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo 'no address here'");
        let descriptor =
            PluginDescriptor::new(PluginId::from_static("mute"), path, Capabilities::default())
                .with_connection(ConnectionType::Tcp);

        let err = launcher(dir.path())
            .start(&descriptor, PluginType::ComponentLister)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stdout closed"), "got {err}");
    }

    #[tokio::test]
    async fn test_silent_plugin_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "exec sleep 30");
        let descriptor =
            PluginDescriptor::new(PluginId::from_static("slow"), path, Capabilities::default())
                .with_connection(ConnectionType::Tcp);

        let err = launcher(dir.path())
            .start(&descriptor, PluginType::ComponentLister)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HandshakeTimeout { .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_hash_mismatch_prevents_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let path = script(dir.path(), &format!("touch {}", marker.display()));
        let descriptor =
            PluginDescriptor::new(PluginId::from_static("tampered"), path, Capabilities::default())
                .with_hash("sha256:00");

        assert!(
            launcher(dir.path())
                .start(&descriptor, PluginType::ResourceRepository)
                .await
                .is_err()
        );
        assert!(!marker.exists());
    }
}
