use std::io;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Graceful shutdown coordinator
///
/// Receivers must be created with [`subscribe`](Self::subscribe) before
/// [`shutdown`](Self::shutdown) is called to observe it; the server
/// subscribes at construction time so an early `stop()` is never lost.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to shutdown signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for OS shutdown signals (SIGINT, SIGTERM), then trigger shutdown once.
    pub async fn wait_for_signal(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT (CTRL+C)");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received CTRL+C");
        }

        info!("Initiating graceful shutdown...");
        self.shutdown();
        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a cleanup future, giving up after `timeout`.
///
/// Returns `true` if the cleanup finished in time.
pub async fn cleanup_with_timeout<F>(cleanup: F, timeout: Duration) -> bool
where
    F: std::future::Future<Output = ()>,
{
    match tokio::time::timeout(timeout, cleanup).await {
        Ok(_) => {
            info!("Cleanup completed successfully");
            true
        }
        Err(_) => {
            warn!("Cleanup timed out after {:?}", timeout);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordination() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        // Trigger shutdown
        coordinator.shutdown();

        // Should receive signal
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_without_subscribers_is_harmless() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();

        let mut rx = coordinator.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cleanup_with_timeout() {
        let finished = cleanup_with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(finished);

        let finished = cleanup_with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(!finished);
    }
}
