use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::sync::{Semaphore, broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::preflight::{self, PreflightError};
use crate::server::metrics::{self, Metrics};
use crate::store::BackingFile;
use crate::transport::connection::{ConnectionContext, serve_connection};
use crate::transport::framing::FrameCodec;
use crate::transport::shutdown::{ShutdownCoordinator, cleanup_with_timeout};

/// Pause after a failed `accept` so a persistent error doesn't spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle of a [`Server`]. Ordered: a server only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Constructed,
    Listening,
    Stopping,
    Stopped,
}

/// Unix socket server that appends to / clears a single backing file.
///
/// ```no_run
/// use sockwrite::{Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let server = Server::new(ServerConfig::new("/tmp/sockwrite.sock", "/tmp/out.txt"))?;
///     let handle = server.handle();
///
///     tokio::spawn(async move {
///         let _ = handle.shutdown_coordinator().wait_for_signal().await;
///     });
///
///     server.start().await
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    context: Arc<ConnectionContext>,
    shutdown: Arc<ShutdownCoordinator>,
    shutdown_rx: broadcast::Receiver<()>,
    state: watch::Sender<ServerState>,
}

/// Cloneable handle for stopping and observing a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<ShutdownCoordinator>,
    state: watch::Receiver<ServerState>,
    metrics: Arc<Metrics>,
}

impl ServerHandle {
    /// Ask the server to stop. Safe to call more than once or before `start`.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the server has reached `target` (or a later state).
    pub async fn wait_for(&self, target: ServerState) -> Result<ServerState> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| *state >= target)
            .await
            .context("server dropped before reaching the requested state")?;
        Ok(*state)
    }

    pub fn shutdown_coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

impl Server {
    /// Validate the configured paths and make sure the backing file exists.
    ///
    /// Does not bind the socket; that happens in [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Result<Self, PreflightError> {
        preflight::check(&config.socket_path, &config.file_path)?;

        let context = Arc::new(ConnectionContext::new(
            BackingFile::new(&config.file_path),
            FrameCodec::new(config.max_content_length),
            Arc::new(Metrics::new()),
        ));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let shutdown_rx = shutdown.subscribe();
        let (state, _) = watch::channel(ServerState::Constructed);

        Ok(Self {
            config,
            context,
            shutdown,
            shutdown_rx,
            state,
        })
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            state: self.state.subscribe(),
            metrics: self.context.metrics.clone(),
        }
    }

    /// Bind the socket and serve until stopped.
    ///
    /// Consumes the server: once this returns the server cannot be restarted.
    pub async fn start(self) -> Result<()> {
        let Server {
            config,
            context,
            shutdown: _shutdown,
            mut shutdown_rx,
            state,
        } = self;

        remove_stale_socket(&config.socket_path)?;
        let listener = UnixListener::bind(&config.socket_path).with_context(|| {
            format!("failed to bind socket {}", config.socket_path.display())
        })?;

        state.send_replace(ServerState::Listening);
        metrics::log_startup(&config.socket_path, &config.file_path, config.max_connections);

        // The field is public, so it may have bypassed `with_max_connections`
        let limit = config.max_connections.clamp(1, Semaphore::MAX_PERMITS);
        let permits = Arc::new(Semaphore::new(limit));
        let mut connections = JoinSet::new();

        loop {
            // Reap finished handlers so the set doesn't grow without bound
            while let Some(result) = connections.try_join_next() {
                log_task_result(result);
            }

            // Wait for a free slot before accepting
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => {
                    permit.context("connection semaphore closed")?
                }
                _ = shutdown_rx.recv() => break,
            };

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            connections.spawn(serve_connection(stream, context.clone(), permit));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {:?}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Shutting down Unix socket server");
        state.send_replace(ServerState::Stopping);

        drop(listener);
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove socket file {}: {}", config.socket_path.display(), e);
            }
        }

        info!("Draining {} in-flight connection(s)", connections.len());
        let drained = cleanup_with_timeout(
            async {
                while let Some(result) = connections.join_next().await {
                    log_task_result(result);
                }
            },
            config.drain_timeout,
        )
        .await;

        if !drained {
            warn!("Aborting {} connection(s) that did not finish", connections.len());
            connections.shutdown().await;
        }

        state.send_replace(ServerState::Stopped);
        context.metrics.snapshot().report();
        metrics::log_shutdown();

        Ok(())
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Connection task panicked: {}", e);
        } else {
            debug!("Connection task cancelled");
        }
    }
}

/// Remove a socket left behind by a previous run.
///
/// Refuses to touch anything at the path that is not a socket.
fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to stat {}", path.display()));
        }
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !metadata.file_type().is_socket() {
            anyhow::bail!("path {} exists but is not a socket", path.display());
        }
    }

    std::fs::remove_file(path)
        .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}
