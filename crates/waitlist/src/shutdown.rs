//! Graceful shutdown for the waitlist service.
//!
//! SIGINT/SIGTERM are turned into one broadcast that stops:
//! - The HTTP server (in-flight requests finish first)
//! - The expiry sweeper

use anyhow::{Context, Result};
use tokio::sync::broadcast;

/// Broadcasts a single shutdown request to every long-running task
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver for the shutdown request
    ///
    /// Subscribe before spawning the task that listens on it.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask every subscriber to stop
    pub fn trigger(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Shutdown requested with no running tasks");
        }
    }

    /// Trigger shutdown on the first SIGINT or SIGTERM
    pub async fn trigger_on_signal(&self) -> Result<()> {
        let (mut sigint, mut sigterm) = signal_channels().await?;
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            tracing::info!("Initiating graceful shutdown...");
            this.trigger();
        });
        Ok(())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once shutdown is requested or the sender is gone
pub async fn wait(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

/// Create signal channels for SIGINT and SIGTERM
///
/// Returns receivers that will receive a value when the signal is detected
pub async fn signal_channels() -> Result<(broadcast::Receiver<()>, broadcast::Receiver<()>)> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;

        let (sigint_tx, sigint_rx) = broadcast::channel(1);
        let (sigterm_tx, sigterm_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            let _ = sigint.recv().await;
            tracing::info!("Received SIGINT");
            let _ = sigint_tx.send(());
        });

        tokio::spawn(async move {
            let _ = sigterm.recv().await;
            tracing::info!("Received SIGTERM");
            let _ = sigterm_tx.send(());
        });

        Ok((sigint_rx, sigterm_rx))
    }

    #[cfg(not(unix))]
    {
        // On non-Unix platforms, use Ctrl-C
        let (sigint_tx, sigint_rx) = broadcast::channel(1);
        let (sigterm_tx, sigterm_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl-C");
            let _ = sigint_tx.send(());
            let _ = sigterm_tx.send(());
        });

        Ok((sigint_rx, sigterm_rx))
    }
}
