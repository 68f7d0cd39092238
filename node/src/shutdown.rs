//! Shutdown latch for the node's workers.
//!
//! Workers `select!` on [`ShutdownSignal::triggered`] alongside their
//! interval tick. The latch stays set, so a worker that subscribes after
//! shutdown stops on its first poll.

use tokio::signal;
use tokio::sync::watch;

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Receiving half handed to each worker.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested or the controller is gone.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown programmatically. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Wait for SIGTERM or SIGINT, or a programmatic shutdown, then latch.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        let mut local = self.subscribe();

        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    tracing::info!("received SIGINT, shutting down");
                }
                _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = local.triggered() => tracing::debug!("shutdown requested"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    tracing::info!("received ctrl-c, shutting down");
                }
                _ = local.triggered() => tracing::debug!("shutdown requested"),
            }
        }

        self.shutdown();
        Ok(())
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
