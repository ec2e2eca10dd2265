//! Alert delivery channels.
//!
//! Every channel makes exactly one attempt per alert. Callers turn the
//! result into a [`DeliveryReport`](crate::models::DeliveryReport); a failed
//! channel never aborts the interaction that triggered it.

pub mod email;

use crate::errors::ServiceError;
use crate::models::AlertPayload;
use async_trait::async_trait;
use thiserror::Error;

pub use email::SmtpAlertChannel;

/// Alert channel errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{status} {body}")]
    Rejected { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    Message(String),
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotConfigured(msg) => ServiceError::NotConfigured(msg),
            NotificationError::Serialization(e) => ServiceError::SerializationError(e.to_string()),
            NotificationError::Message(msg) => ServiceError::ValidationError(msg),
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// One way of telling a person that stock is about to expire.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Short stable name used in delivery reports and logs
    fn name(&self) -> &'static str;

    /// Single delivery attempt; the `Ok` value is the collaborator's reply.
    async fn deliver(&self, payload: &AlertPayload) -> Result<String, NotificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn rejected_renders_status_and_body() {
        let err = NotificationError::Rejected {
            status: 500,
            body: "workflow crashed".into(),
        };
        assert_eq!(err.to_string(), "500 workflow crashed");

        let service: ServiceError = err.into();
        assert_eq!(service.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn not_configured_maps_to_unavailable() {
        let service: ServiceError = NotificationError::NotConfigured("webhook".into()).into();
        assert_eq!(service.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
