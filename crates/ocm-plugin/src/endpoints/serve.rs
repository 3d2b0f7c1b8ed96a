//! Listening on the socket or TCP port named by the launch config.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;
use ocm_telemetry::{REQUEST_ID_HEADER, RequestContext};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::Endpoints;
use crate::error::PluginResult;
use crate::types::{ConnectionType, LaunchConfig, PluginLocation};

/// Counts requests so an idle plugin can exit on its own.
#[derive(Debug)]
pub(crate) struct IdleTracker {
    timeout: Duration,
    in_flight: AtomicUsize,
    activity: Notify,
}

impl IdleTracker {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            in_flight: AtomicUsize::new(0),
            activity: Notify::new(),
        }
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.activity.notify_one();
    }

    fn end(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.activity.notify_one();
    }

    /// Resolves once `timeout` passes with no request in flight and none
    /// started or finished.
    async fn expired(&self) {
        loop {
            let quiet = tokio::time::timeout(self.timeout, self.activity.notified())
                .await
                .is_err();
            if quiet && self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
        }
    }
}

async fn track_activity(
    State(tracker): State<Arc<IdleTracker>>,
    request: Request,
    next: Next,
) -> Response {
    tracker.begin();
    let response = next.run(request).await;
    tracker.end();
    response
}

/// Runs each request inside the span of the host's request ID.
async fn trace_request(State(instance): State<Arc<str>>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let ctx = RequestContext::received(&*instance, request.uri().path(), header);
    async {
        let response = next.run(request).await;
        debug!(status = %response.status(), elapsed_ms = ctx.elapsed_ms(), "Request served");
        response
    }
    .instrument(ctx.span())
    .await
}

async fn idle_expired(tracker: Option<Arc<IdleTracker>>) {
    match tracker {
        Some(tracker) => tracker.expired().await,
        None => std::future::pending().await,
    }
}

enum BoundListener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

/// Endpoints bound to their listener, ready to serve.
pub struct BoundPlugin {
    location: PluginLocation,
    listener: BoundListener,
    router: Router,
    idle: Option<Arc<IdleTracker>>,
}

impl std::fmt::Debug for BoundPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPlugin")
            .field("location", &self.location)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

impl BoundPlugin {
    /// Where the plugin listens.
    #[must_use]
    pub fn location(&self) -> &PluginLocation {
        &self.location
    }

    /// Serve until `cancel` fires or the idle timeout elapses, then finish
    /// in-flight requests and remove the socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn run_until(self, cancel: CancellationToken) -> PluginResult<()> {
        let idle = self.idle;
        let shutdown = async move {
            tokio::select! {
                () = cancel.cancelled() => debug!("Shutdown requested"),
                () = idle_expired(idle) => info!("Idle timeout elapsed, shutting down"),
            }
        };

        match self.listener {
            BoundListener::Unix { listener, path } => {
                let result = axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown)
                    .await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove plugin socket");
                }
                result?;
            },
            BoundListener::Tcp(listener) => {
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown)
                    .await?;
            },
        }
        info!("Plugin stopped");
        Ok(())
    }
}

impl Endpoints {
    /// Bind the listener for `config` without serving yet.
    ///
    /// Socket plugins replace any stale socket file; TCP plugins bind an
    /// ephemeral port on the loopback interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability is not served or binding fails.
    pub async fn bind(&self, config: &LaunchConfig) -> PluginResult<BoundPlugin> {
        let instance: Arc<str> = Arc::from(config.id.as_str());
        let mut router = self
            .router(config.plugin_type)?
            .layer(middleware::from_fn_with_state(instance, trace_request));
        let idle = config
            .idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Arc::new(IdleTracker::new(Duration::from_secs(secs))));
        if let Some(tracker) = &idle {
            let activity = middleware::from_fn_with_state(Arc::clone(tracker), track_activity);
            router = router.layer(activity);
        }

        let (location, listener) = match config.connection {
            ConnectionType::Socket => {
                let path = config.socket_path();
                if let Some(dir) = path.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "Removed stale socket"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                    Err(e) => return Err(e.into()),
                }
                let listener = UnixListener::bind(&path)?;
                (
                    PluginLocation::Socket(path.clone()),
                    BoundListener::Unix { listener, path },
                )
            },
            ConnectionType::Tcp => {
                let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
                (
                    PluginLocation::Tcp(listener.local_addr()?),
                    BoundListener::Tcp(listener),
                )
            },
        };

        info!(
            id = %config.id,
            plugin_type = %config.plugin_type,
            location = %location,
            "Plugin listening"
        );
        Ok(BoundPlugin {
            location,
            listener,
            router,
            idle,
        })
    }

    /// Serve `config` until SIGINT, SIGTERM or the idle timeout.
    ///
    /// TCP plugins print their address as the first line on stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails.
    pub async fn serve(&self, config: &LaunchConfig) -> PluginResult<()> {
        let bound = self.bind(config).await?;
        if let PluginLocation::Tcp(addr) = bound.location() {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{addr}")?;
            stdout.flush()?;
        }

        let cancel = CancellationToken::new();
        let signals = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                termination_signal().await;
                cancel.cancel();
            }
        });
        let result = bound.run_until(cancel).await;
        signals.abort();
        result
    }
}

async fn termination_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    tokio::select! {
        () = interrupt => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
