//! Readiness handshake with a freshly spawned plugin.

use std::path::Path;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, info};

use super::child::ManagedProcess;
use crate::config::HandshakeConfig;
use crate::error::{PluginError, PluginResult};
use crate::types::{PluginId, PluginLocation};

/// Poll for the plugin's socket file with doubling delays.
///
/// Fails early if the process exits before the socket appears.
pub(crate) async fn wait_for_socket(
    plugin_id: &PluginId,
    path: &Path,
    handshake: &HandshakeConfig,
    process: &dyn ManagedProcess,
) -> PluginResult<PluginLocation> {
    let mut delay = handshake.initial_backoff();
    for attempt in 0..handshake.poll_attempts {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(
                plugin_id = %plugin_id,
                attempt,
                path = %path.display(),
                "Plugin socket is ready"
            );
            return Ok(PluginLocation::Socket(path.to_path_buf()));
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {},
            result = process.wait() => {
                let detail = result.err().map(|e| format!(": {e}")).unwrap_or_default();
                return Err(PluginError::Start {
                    plugin_id: plugin_id.clone(),
                    message: format!("process exited before creating {}{detail}", path.display()),
                });
            },
        }
        delay = delay.saturating_mul(2).min(handshake.max_backoff());
    }

    Err(PluginError::Start {
        plugin_id: plugin_id.clone(),
        message: format!(
            "socket {} did not appear after {} attempts",
            path.display(),
            handshake.poll_attempts
        ),
    })
}

/// Read stdout until a line holds the plugin's address.
///
/// Lines before the address are logged. EOF before an address fails.
pub(crate) async fn read_tcp_address<R>(
    plugin_id: &PluginId,
    lines: &mut Lines<R>,
) -> PluginResult<PluginLocation>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = lines.next_line().await.map_err(|e| PluginError::Start {
            plugin_id: plugin_id.clone(),
            message: format!("failed to read plugin stdout: {e}"),
        })?;
        let Some(line) = line else {
            return Err(PluginError::Start {
                plugin_id: plugin_id.clone(),
                message: "stdout closed before the plugin reported its address".into(),
            });
        };

        if let Some(location) = PluginLocation::parse_tcp_line(&line) {
            return Ok(location);
        }
        info!(plugin_id = %plugin_id, stream = "stdout", "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::Notify;

    /// A process that exits when told to.
    struct FakeProcess {
        id: PluginId,
        exited: Notify,
    }

    impl FakeProcess {
        fn new() -> Self {
            Self {
                id: PluginId::from_static("fake"),
                exited: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ManagedProcess for FakeProcess {
        fn plugin_id(&self) -> &PluginId {
            &self.id
        }

        fn interrupt(&self) -> PluginResult<()> {
            Ok(())
        }

        async fn wait(&self) -> PluginResult<()> {
            self.exited.notified().await;
            Ok(())
        }

        fn kill(&self) {}
    }

    fn fast() -> HandshakeConfig {
        HandshakeConfig {
            poll_attempts: 5,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            ..HandshakeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_socket_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-plugin.socket");
        std::fs::write(&path, b"").unwrap();

        let id = PluginId::from_static("p");
        let location = wait_for_socket(&id, &path, &fast(), &FakeProcess::new())
            .await
            .unwrap();
        assert_eq!(location, PluginLocation::Socket(path));
    }

    #[tokio::test]
    async fn test_socket_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-plugin.socket");
        let err = wait_for_socket(&PluginId::from_static("p"), &path, &fast(), &FakeProcess::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("5 attempts"));
    }

    #[tokio::test]
    async fn test_socket_wait_stops_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-plugin.socket");
        let process = FakeProcess::new();
        let config = HandshakeConfig {
            poll_attempts: 1000,
            initial_backoff_ms: 50,
            max_backoff_ms: 50,
            ..HandshakeConfig::default()
        };

        let id = PluginId::from_static("p");
        let wait = wait_for_socket(&id, &path, &config, &process);
        let (result, ()) = tokio::join!(wait, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            process.exited.notify_one();
        });
        assert!(result.unwrap_err().to_string().contains("exited"));
    }

    #[tokio::test]
    async fn test_tcp_address_after_noise() {
        let output: &[u8] = b"booting\nhttp://127.0.0.1:4100\nserving\n";
        let mut lines = BufReader::new(output).lines();
        let location = read_tcp_address(&PluginId::from_static("p"), &mut lines)
            .await
            .unwrap();
        assert_eq!(location, PluginLocation::Tcp("127.0.0.1:4100".parse().unwrap()));
        // Remaining output is left for the log forwarder.
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("serving"));
    }

    #[tokio::test]
    async fn test_tcp_eof_before_address() {
        let output: &[u8] = b"booting\n";
        let mut lines = BufReader::new(output).lines();
        assert!(matches!(
            read_tcp_address(&PluginId::from_static("p"), &mut lines).await,
            Err(PluginError::Start { .. })
        ));
    }
}
