//! Child process handle.
//!
//! A [`ChildProcess`] owns the cancellation token of one plugin process. A
//! reaper task owns the OS [`Child`] and publishes its exit through a watch
//! channel, so interrupting, waiting and killing never need `&mut Child`.

use std::process::ExitStatus;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::types::PluginId;

/// How a plugin process ended.
#[derive(Debug, Clone)]
pub enum ProcessExit {
    /// The process exited with this status.
    Exited(ExitStatus),
    /// Reaping the process failed.
    WaitFailed(String),
}

/// The process lifecycle operations the shutdown coordinator needs.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// The plugin this process serves.
    fn plugin_id(&self) -> &PluginId;

    /// Ask the process to exit.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Process`] if the signal cannot be delivered.
    fn interrupt(&self) -> PluginResult<()>;

    /// Wait until the process has exited.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Process`] if the exit status cannot be read.
    async fn wait(&self) -> PluginResult<()>;

    /// Force-kill the process. Does not wait for it to exit.
    fn kill(&self);
}

/// Handle to a spawned plugin process.
#[derive(Debug)]
pub struct ChildProcess {
    plugin_id: PluginId,
    pid: Option<u32>,
    cancel: CancellationToken,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl ChildProcess {
    /// Take ownership of a spawned child and start reaping it.
    #[must_use]
    pub fn spawn(plugin_id: PluginId, mut child: Child) -> Self {
        let pid = child.id();
        let cancel = CancellationToken::new();
        let (tx, exit) = watch::channel(None);

        let token = cancel.clone();
        let id = plugin_id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => Some(status),
                () = token.cancelled() => None,
            };
            let status = match status {
                Some(status) => status,
                None => {
                    debug!(plugin_id = %id, "Killing plugin process");
                    if let Err(e) = child.start_kill() {
                        warn!(plugin_id = %id, error = %e, "Failed to kill plugin process");
                    }
                    child.wait().await
                },
            };

            let exit = match status {
                Ok(status) => {
                    info!(plugin_id = %id, status = %status, "Plugin process exited");
                    ProcessExit::Exited(status)
                },
                Err(e) => ProcessExit::WaitFailed(e.to_string()),
            };
            tx.send_replace(Some(exit));
        });

        Self {
            plugin_id,
            pid,
            cancel,
            exit,
        }
    }

    /// OS process ID, if the process was still running when adopted.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The exit, if the process has already ended.
    #[must_use]
    pub fn try_exit(&self) -> Option<ProcessExit> {
        self.exit.borrow().clone()
    }

    fn process_error(&self, message: impl Into<String>) -> PluginError {
        PluginError::Process {
            plugin_id: self.plugin_id.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    fn interrupt(&self) -> PluginResult<()> {
        if self.try_exit().is_some() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let pid = i32::try_from(pid)
            .map_err(|e| self.process_error(format!("invalid pid {pid}: {e}")))?;

        match kill(Pid::from_raw(pid), Signal::SIGINT) {
            // Already gone.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(self.process_error(format!("failed to send SIGINT: {e}"))),
        }
    }

    async fn wait(&self) -> PluginResult<()> {
        let mut exit = self.exit.clone();
        let result = exit
            .wait_for(Option::is_some)
            .await
            .map(|exit| exit.clone())
            .map_err(|_| self.process_error("process reaper stopped"))?;

        match result {
            Some(ProcessExit::WaitFailed(message)) => Err(self.process_error(message)),
            _ => Ok(()),
        }
    }

    fn kill(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn sleeper(script: &str) -> ChildProcess {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        ChildProcess::spawn(PluginId::from_static("sleeper"), child)
    }

    #[tokio::test]
    async fn test_interrupt_stops_process() {
        let process = sleeper("sleep 30");
        assert!(process.pid().is_some());
        process.interrupt().unwrap();
        tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(process.try_exit(), Some(ProcessExit::Exited(_))));
    }

    #[tokio::test]
    async fn test_kill_ignores_interrupts() {
        let process = sleeper("trap '' INT; sleep 30");
        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(100)).await;
        process.interrupt().unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(200), process.wait())
                .await
                .is_err()
        );

        process.kill();
        tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_after_exit_is_ok() {
        let process = sleeper("exit 0");
        process.wait().await.unwrap();
        assert!(process.interrupt().is_ok());
    }
}
