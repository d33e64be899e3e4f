//! Periodic claim-window sweep

use std::time::Duration;

use tokio::{sync::broadcast, time::MissedTickBehavior};
use tracing::{debug, error, info};
use waitlist_core::QueueCoordinator;

/// Run `sweep_expired` every `period` until shutdown is requested.
pub async fn run_sweeper(
    coordinator: QueueCoordinator,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "Expiry sweeper started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => {
                info!("Expiry sweeper stopped");
                return;
            }
        }

        match coordinator.sweep_expired().await {
            Ok(report) if report.is_empty() => debug!("Sweep found nothing to do"),
            Ok(report) => {
                if !report.failed.is_empty() {
                    error!(failed = ?report.failed, "Sweep left equipment for the next pass");
                }
            }
            Err(e) => error!(error = %e, "Sweep failed"),
        }
    }
}
