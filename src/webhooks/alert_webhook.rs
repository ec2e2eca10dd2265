use crate::errors::ServiceError;
use crate::models::AlertPayload;
use crate::notifications::{AlertChannel, NotificationError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Posts alert payloads to a workflow-automation webhook.
///
/// One attempt per alert, no retry or backoff; a non-2xx reply or a
/// transport failure is reported back to the caller as-is.
#[derive(Clone, Debug)]
pub struct AlertWebhookChannel {
    client: reqwest::Client,
    url: Option<String>,
}

impl AlertWebhookChannel {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl AlertChannel for AlertWebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, payload), fields(risky_items = payload.risky_items.len()))]
    async fn deliver(&self, payload: &AlertPayload) -> Result<String, NotificationError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| NotificationError::NotConfigured("webhook URL is not set".into()))?;

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "webhook delivery error");
                NotificationError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            info!(status = status.as_u16(), "webhook delivered");
            Ok(format!("{} {}", status.as_u16(), body))
        } else {
            warn!(status = status.as_u16(), "webhook delivery rejected");
            Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryRow;

    fn payload() -> AlertPayload {
        AlertPayload {
            risk_score: 0,
            risky_items: vec![InventoryRow::with_days_remaining(-1)],
            alert_time: "2024-05-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn missing_url_is_not_configured() {
        let channel = AlertWebhookChannel::new(Some("  ".into()), Duration::from_secs(1)).unwrap();
        assert!(!channel.is_configured());

        let err = channel.deliver(&payload()).await.unwrap_err();
        assert!(matches!(err, NotificationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let channel = AlertWebhookChannel::new(
            Some("http://127.0.0.1:1/hook".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = channel.deliver(&payload()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Transport(_)));
    }
}
