/// Webhook delivery for external workflow automation
pub mod alert_webhook;

pub use alert_webhook::AlertWebhookChannel;
