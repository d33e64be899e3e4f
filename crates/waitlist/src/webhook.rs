//! Webhook notification gateway

use std::time::Duration;

use waitlist_core::{Error, NotificationGateway, Result, TurnNotice};

/// POSTs each turn notice as JSON to a fixed URL
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
}

impl WebhookGateway {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl NotificationGateway for WebhookGateway {
    async fn notify(&self, notice: &TurnNotice) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| Error::DeliveryFailed(format!("POST {}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DeliveryFailed(format!(
                "POST {} returned {status}",
                self.url
            )));
        }

        tracing::debug!(
            member_id = %notice.member_id,
            equipment_id = %notice.equipment_id,
            "Turn notice delivered"
        );
        Ok(())
    }
}
