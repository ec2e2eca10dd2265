use super::{AlertChannel, NotificationError};
use crate::config::{SmtpConfig, SmtpSettings};
use crate::models::AlertPayload;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

pub const ALERT_SUBJECT: &str = "Dairy Inventory Alert - Items Near Expiry";

const SUBMISSION_PORT: u16 = 587;
const SMTPS_PORT: u16 = 465;

/// Direct mail to a single receiver.
#[derive(Clone, Debug)]
pub struct SmtpAlertChannel {
    settings: SmtpSettings,
}

impl SmtpAlertChannel {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// `None` unless every SMTP field is configured
    pub fn from_config(config: &SmtpConfig) -> Option<Self> {
        config.settings().map(Self::new)
    }

    pub fn build_message(&self, payload: &AlertPayload) -> Result<Message, NotificationError> {
        let from: Mailbox = self
            .settings
            .sender
            .parse()
            .map_err(|e| NotificationError::Message(format!("sender address: {}", e)))?;
        let to: Mailbox = self
            .settings
            .receiver
            .parse()
            .map_err(|e| NotificationError::Message(format!("receiver address: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(ALERT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(alert_body(payload)?)
            .map_err(|e| NotificationError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
        let settings = &self.settings;
        let builder = match settings.port {
            SUBMISSION_PORT => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| NotificationError::Transport(e.to_string()))?,
            SMTPS_PORT => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| NotificationError::Transport(e.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
        };

        Ok(builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build())
    }
}

/// `Risk score: N`, a blank line, then the risky items as indented JSON.
pub fn alert_body(payload: &AlertPayload) -> Result<String, NotificationError> {
    Ok(format!(
        "Risk score: {}\n\nItems:\n{}",
        payload.risk_score,
        serde_json::to_string_pretty(&payload.risky_items)?
    ))
}

#[async_trait]
impl AlertChannel for SmtpAlertChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    #[instrument(skip(self, payload), fields(host = %self.settings.host, port = self.settings.port))]
    async fn deliver(&self, payload: &AlertPayload) -> Result<String, NotificationError> {
        let message = self.build_message(payload)?;
        let transport = self.transport()?;

        match transport.send(message).await {
            Ok(response) => {
                info!(code = %response.code(), "alert mail accepted");
                let text = response.message().collect::<Vec<_>>().join(" ");
                Ok(format!("{} {}", response.code(), text))
            }
            Err(e) => {
                warn!(error = %e, "alert mail failed");
                Err(NotificationError::Transport(e.to_string()))
            }
        }
    }
}
