//! HTTP server and background sweeper lifecycle

use anyhow::{Context, Result};
use tower_http::trace::TraceLayer;
use waitlist_core::QueueCoordinator;

use crate::{
    api,
    config::Config,
    shutdown::{wait as shutdown_requested, Shutdown},
    sweeper::run_sweeper,
};

/// Serve the API and run the sweeper until `shutdown` fires.
pub async fn serve(config: &Config, coordinator: QueueCoordinator, shutdown: Shutdown) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    let local_addr = listener.local_addr().context("Listener has no local address")?;

    let sweeper = tokio::spawn(run_sweeper(
        coordinator.clone(),
        config.sweep_interval(),
        shutdown.subscribe(),
    ));

    let app = api::router(coordinator).layer(TraceLayer::new_for_http());
    tracing::info!(addr = %local_addr, "Waitlist API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown.subscribe()))
        .await
        .context("HTTP server failed");

    // Stop the sweeper even when the server exited on its own
    shutdown.trigger();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Sweeper task failed");
    }

    tracing::info!("Waitlist API stopped");
    served
}
