use super::{InventoryRow, RiskAssessment};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Body sent to every alert channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub risk_score: u8,
    pub risky_items: Vec<InventoryRow>,
    /// RFC 3339, UTC, `Z` suffix
    pub alert_time: String,
}

impl AlertPayload {
    pub fn from_assessment(assessment: &RiskAssessment, at: DateTime<Utc>) -> Self {
        Self {
            risk_score: assessment.risk_score,
            risky_items: assessment.risky_rows.clone(),
            alert_time: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub channel: String,
    pub delivered: bool,
    /// Collaborator response on success, raw error text on failure
    pub detail: String,
}

impl DeliveryReport {
    pub fn delivered(channel: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: true,
            detail: detail.into(),
        }
    }

    pub fn failed(channel: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: false,
            detail: detail.into(),
        }
    }
}
