use super::AlertService;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts `{"content": message}` to a chat webhook (Discord-compatible).
pub struct WebhookAlerter {
    client: Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: String) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_ALERT_TIMEOUT)
    }

    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertService for WebhookAlerter {
    async fn send_alert(&self, message: &str) -> Result<()> {
        tracing::debug!("Sending alert to webhook");

        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: message })
            .send()
            .await
            .map_err(|e| Error::Alert(format!("Failed to send alert: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Alert(format!(
                "Webhook error (status {}): {}",
                status, error_text
            )));
        }

        Ok(())
    }
}
