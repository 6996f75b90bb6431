use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Payload posted when a product drops to or below its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub threshold: i32,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notification endpoint returned status {0}")]
    BadStatus(u16),
}

/// Outbound notification transport. Implementations must be safe to call
/// fire-and-forget; the caller never rolls back on sink failure.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_low_stock(&self, alert: LowStockAlert) -> Result<(), NotificationError>;
}

/// Posts alerts to a configured webhook URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    #[instrument(skip(self, alert), fields(product_id = %alert.product_id))]
    async fn notify_low_stock(&self, alert: LowStockAlert) -> Result<(), NotificationError> {
        let response = self.client.post(&self.url).json(&alert).send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::BadStatus(response.status().as_u16()));
        }
        debug!("low stock alert delivered");
        Ok(())
    }
}

/// Discards alerts. Used when no webhook URL is configured.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn notify_low_stock(&self, alert: LowStockAlert) -> Result<(), NotificationError> {
        debug!(product_id = %alert.product_id, quantity = alert.quantity, "low stock (no sink configured)");
        Ok(())
    }
}

/// Collects alerts in memory for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<LowStockAlert>>,
}

impl RecordingSink {
    pub async fn alerts(&self) -> Vec<LowStockAlert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_low_stock(&self, alert: LowStockAlert) -> Result<(), NotificationError> {
        self.alerts.lock().await.push(alert);
        Ok(())
    }
}
