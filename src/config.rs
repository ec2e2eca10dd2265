use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_MODEL: &str = "gemini-1.5-pro";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 20;

/// Secret names used by earlier deployments; each maps onto a config key.
const LEGACY_SECRET_KEYS: [(&str, &str); 8] = [
    ("N8N_WEBHOOK_URL", "webhook.url"),
    ("GEMINI_API_KEY", "ai.api_key"),
    ("SMTP_HOST", "smtp.host"),
    ("SMTP_PORT", "smtp.port"),
    ("SMTP_USER", "smtp.user"),
    ("SMTP_PASSWORD", "smtp.password"),
    ("ALERT_SENDER", "smtp.sender"),
    ("ALERT_RECEIVER", "smtp.receiver"),
];

/// Outbound workflow-automation webhook
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct WebhookConfig {
    /// Target URL; alerts are only posted when set
    #[serde(default)]
    #[validate(url)]
    pub url: Option<String>,

    /// Client-side cap for the single delivery attempt
    #[serde(default = "default_webhook_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Generative-AI text service
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[serde(default = "default_ai_model")]
    #[validate(length(min = 1))]
    pub model: String,

    #[serde(default = "default_ai_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

impl AiConfig {
    /// Key with surrounding whitespace removed; blank keys count as unset
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Direct-mail fallback. Every field is optional; mail is only attempted
/// once all of them are present.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

/// Fully resolved SMTP settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
    pub receiver: String,
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Returns the settings only when host, port, credentials and both
    /// addresses are present and non-blank.
    pub fn settings(&self) -> Option<SmtpSettings> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Some(SmtpSettings {
            host: present(&self.host)?,
            port: self.port.filter(|port| *port > 0)?,
            user: present(&self.user)?,
            password: self.password.clone().filter(|p| !p.is_empty())?,
            sender: present(&self.sender)?,
            receiver: present(&self.receiver)?,
            timeout: Duration::from_secs(if self.timeout_secs == 0 {
                DEFAULT_SMTP_TIMEOUT_SECS
            } else {
                self.timeout_secs
            }),
        })
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    #[validate(range(min = 1024))]
    pub max_upload_bytes: usize,

    #[serde(default)]
    #[validate]
    pub webhook: WebhookConfig,

    #[serde(default)]
    #[validate]
    pub ai: AiConfig,

    #[serde(default)]
    #[validate]
    pub smtp: SmtpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            max_upload_bytes: default_max_upload_bytes(),
            webhook: WebhookConfig::default(),
            ai: AiConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        // A half-filled SMTP section is almost always a typo in a secret name
        let smtp = &self.smtp;
        let any_smtp = smtp.host.is_some()
            || smtp.user.is_some()
            || smtp.sender.is_some()
            || smtp.receiver.is_some();
        if !self.is_development() && any_smtp && smtp.settings().is_none() {
            let mut err = ValidationError::new("smtp_incomplete");
            err.message = Some(
                "SMTP requires host, port, user, password, sender and receiver together".into(),
            );
            errors.add("smtp", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_webhook_timeout_secs() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

fn default_ai_endpoint() -> String {
    DEFAULT_AI_ENDPOINT.to_string()
}

fn default_ai_model() -> String {
    DEFAULT_AI_MODEL.to_string()
}

fn default_ai_timeout_secs() -> u64 {
    DEFAULT_AI_TIMEOUT_SECS
}

fn default_smtp_timeout_secs() -> u64 {
    DEFAULT_SMTP_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!(
        "dairy_waste_guard={level},waste_guard={level},tower_http=debug",
        level = level
    );
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order, later ones winning:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Legacy secret variables (N8N_WEBHOOK_URL, GEMINI_API_KEY, SMTP_*, ALERT_*)
/// 5. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit configuration directory
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let vars: Map<String, String> = env::vars().collect();
    load_config_with_env(config_dir, &vars)
}

/// Legacy secret variables re-keyed so an `Environment` source with the
/// `__` separator maps them onto their config paths.
fn legacy_secret_vars(vars: &Map<String, String>) -> Map<String, String> {
    LEGACY_SECRET_KEYS
        .iter()
        .filter_map(|(legacy, key)| {
            let value = vars.get(*legacy)?;
            (!value.trim().is_empty()).then(|| (key.replace('.', "__"), value.clone()))
        })
        .collect()
}

fn load_config_with_env(
    config_dir: &Path,
    vars: &Map<String, String>,
) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = vars
        .get("RUN_ENV")
        .or_else(|| vars.get("APP_ENV"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(
            Environment::default()
                .separator("__")
                .try_parsing(true)
                .source(Some(legacy_secret_vars(vars))),
        )
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone())),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        webhook = app_config.webhook.url.is_some(),
        ai = app_config.ai.api_key().is_some(),
        smtp = app_config.smtp.settings().is_some(),
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
