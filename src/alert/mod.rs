//! Out-of-band failure notifications
//!
//! Alerts are best effort: callers log delivery errors and carry on.

pub mod mock;
pub mod webhook;

pub use mock::MockAlerter;
pub use webhook::WebhookAlerter;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AlertService: Send + Sync {
    async fn send_alert(&self, message: &str) -> Result<()>;
}

/// Used when no webhook is configured.
pub struct DisabledAlerter;

#[async_trait]
impl AlertService for DisabledAlerter {
    async fn send_alert(&self, message: &str) -> Result<()> {
        tracing::debug!("Alerting disabled, dropping alert: {}", message);
        Ok(())
    }
}
