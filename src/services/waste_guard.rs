//! Upload orchestration: ingest, normalize, assess, and alert.

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{AlertPayload, DeliveryReport, InventoryBatch, RiskAssessment};
use crate::notifications::{AlertChannel, SmtpAlertChannel};
use crate::services::{ingest, risk_classifier};
use crate::webhooks::AlertWebhookChannel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A normalized batch together with its assessment.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub batch: InventoryBatch,
    pub assessment: RiskAssessment,
}

/// Result of one upload interaction.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub batch: InventoryBatch,
    pub assessment: RiskAssessment,
    /// One entry per channel attempted; empty when no alert went out
    pub deliveries: Vec<DeliveryReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub time: DateTime<Utc>,
    pub deliveries: Vec<DeliveryReport>,
}

impl AlertRecord {
    pub fn any_delivered(&self) -> bool {
        self.deliveries.iter().any(|d| d.delivered)
    }
}

/// State that lives for one interactive session, never shared between
/// sessions.
#[derive(Debug, Clone, Default)]
pub struct AlertSession {
    last_alert: Option<AlertRecord>,
}

impl AlertSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_alert(&self) -> Option<&AlertRecord> {
        self.last_alert.as_ref()
    }

    fn record(&mut self, time: DateTime<Utc>, deliveries: &[DeliveryReport]) {
        self.last_alert = Some(AlertRecord {
            time,
            deliveries: deliveries.to_vec(),
        });
    }
}

#[derive(Clone)]
pub struct WasteGuardService {
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl WasteGuardService {
    /// Channels are attempted in the given order
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    /// Webhook first, then mail when SMTP is fully configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let webhook =
            AlertWebhookChannel::new(config.webhook.url.clone(), config.webhook.timeout())?;
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
        channels.push(Arc::new(webhook));
        if let Some(mail) = SmtpAlertChannel::from_config(&config.smtp) {
            channels.push(Arc::new(mail));
        }
        Ok(Self::new(channels))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn evaluate<R: Read>(&self, reader: R) -> Result<Evaluation, ServiceError> {
        self.evaluate_at(reader, Utc::now())
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit clock.
    pub fn evaluate_at<R: Read>(
        &self,
        reader: R,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, ServiceError> {
        let upload = ingest::read_upload(reader)?;
        let batch = risk_classifier::normalize_upload_at(&upload, now.naive_utc());
        let assessment = risk_classifier::assess(&batch);
        info!(
            batch_id = %batch.id,
            total = assessment.total_count,
            risky = assessment.risky_count(),
            risk_score = assessment.risk_score,
            "inventory assessed"
        );
        Ok(Evaluation { batch, assessment })
    }

    /// Send the assessment to every channel once, in order.
    #[instrument(skip(self, assessment), fields(risky = assessment.risky_count()))]
    pub async fn dispatch_alert(
        &self,
        assessment: &RiskAssessment,
        at: DateTime<Utc>,
    ) -> Vec<DeliveryReport> {
        let payload = AlertPayload::from_assessment(assessment, at);
        let mut deliveries = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let report = match channel.deliver(&payload).await {
                Ok(detail) => DeliveryReport::delivered(channel.name(), detail),
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "alert delivery failed");
                    DeliveryReport::failed(channel.name(), e.to_string())
                }
            };
            deliveries.push(report);
        }
        deliveries
    }

    pub async fn process_upload<R: Read>(
        &self,
        reader: R,
        notify: bool,
        session: &mut AlertSession,
    ) -> Result<UploadOutcome, ServiceError> {
        self.process_upload_at(reader, notify, session, Utc::now())
            .await
    }

    /// One upload interaction. Alerts only go out when requested and the
    /// batch has risky rows; channel failures are reported, not raised.
    pub async fn process_upload_at<R: Read>(
        &self,
        reader: R,
        notify: bool,
        session: &mut AlertSession,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome, ServiceError> {
        let Evaluation { batch, assessment } = self.evaluate_at(reader, now)?;

        let deliveries = if notify && assessment.has_risk() {
            let deliveries = self.dispatch_alert(&assessment, now).await;
            session.record(now, &deliveries);
            deliveries
        } else {
            Vec::new()
        };

        Ok(UploadOutcome {
            batch,
            assessment,
            deliveries,
        })
    }

    /// Manually re-send an alert for an assessment already shown.
    pub async fn resend_alert(
        &self,
        assessment: &RiskAssessment,
        session: &mut AlertSession,
    ) -> Result<Vec<DeliveryReport>, ServiceError> {
        if !assessment.has_risk() {
            return Err(ServiceError::InvalidInput(
                "no items are near expiry; nothing to alert".to_string(),
            ));
        }
        let now = Utc::now();
        let deliveries = self.dispatch_alert(assessment, now).await;
        session.record(now, &deliveries);
        Ok(deliveries)
    }
}
