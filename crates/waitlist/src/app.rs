//! Wiring from configuration to a running coordinator

use std::sync::Arc;

use anyhow::{Context, Result};
use waitlist_core::{
    LogGateway, NotificationGateway, QueueCoordinator, SqliteQueueStore, SystemClock,
};

use crate::{config::Config, webhook::WebhookGateway};

/// Open the store and pick the notification gateway
pub async fn build_coordinator(config: &Config) -> Result<QueueCoordinator> {
    let settings = config.queue_settings()?;

    let store = SqliteQueueStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    let gateway: Arc<dyn NotificationGateway> = match &config.notify.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Sending turn notices to webhook");
            Arc::new(WebhookGateway::new(url.as_str(), config.notify_timeout())?)
        }
        None => {
            tracing::info!("No webhook configured; turn notices are logged only");
            Arc::new(LogGateway)
        }
    };

    Ok(QueueCoordinator::new(
        Arc::new(store),
        gateway,
        Arc::new(SystemClock),
        settings,
    ))
}
