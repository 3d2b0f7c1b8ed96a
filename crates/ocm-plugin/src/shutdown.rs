//! Graceful shutdown of running plugin processes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{PluginError, PluginResult};
use crate::process::ManagedProcess;

/// Tracks started plugin processes and stops them together.
#[derive(Default)]
pub struct ShutdownCoordinator {
    processes: Mutex<Vec<Arc<dyn ManagedProcess>>>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("tracked", &self.tracked())
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a process until the next shutdown.
    pub fn track(&self, process: Arc<dyn ManagedProcess>) {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(process);
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Interrupt every tracked process once, wait for them to exit, and
    /// force-kill whatever is still running when `cancel` fires.
    ///
    /// Processes are stopped concurrently and every failure is collected.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Shutdown`] listing each process that failed to
    /// stop cleanly.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> PluginResult<()> {
        let processes = std::mem::take(
            &mut *self
                .processes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if processes.is_empty() {
            return Ok(());
        }

        info!(count = processes.len(), "Shutting down plugin processes");
        let results = join_all(processes.iter().map(|p| stop(p.as_ref(), cancel))).await;
        PluginError::join(results.into_iter().filter_map(Result::err).collect())
    }

    /// [`shutdown`](Self::shutdown) with a deadline.
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> PluginResult<()> {
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

async fn stop(process: &dyn ManagedProcess, cancel: &CancellationToken) -> PluginResult<()> {
    let id = process.plugin_id().clone();
    let interrupted = process.interrupt();
    if let Err(e) = &interrupted {
        warn!(plugin_id = %id, error = %e, "Failed to interrupt plugin");
    }

    tokio::select! {
        biased;
        result = process.wait() => {
            interrupted?;
            result
        },
        () = cancel.cancelled() => {
            warn!(plugin_id = %id, "Plugin did not exit in time, killing it");
            process.kill();
            Err(PluginError::Process {
                plugin_id: id,
                message: "did not exit before the shutdown deadline and was killed".into(),
            })
        },
    }
}
