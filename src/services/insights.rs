//! Free-text inventory questions answered by a generative-AI service.
//!
//! The provider sits behind [`InsightProvider`] so callers never depend on a
//! particular vendor SDK. Replies are parsed best-effort; the raw text always
//! survives even when it is not valid JSON.

use crate::config::AiConfig;
use crate::errors::ServiceError;
use crate::models::inventory::{PRICE_COLUMN, QUANTITY_COLUMN};
use crate::models::InventoryBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const NO_PRODUCT: &str = "<no-product>";

/// Text-generation backend.
#[async_trait]
pub trait InsightProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Single attempt; returns the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("AI client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// `Ok(None)` when no API key is configured.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, ServiceError> {
        match config.api_key() {
            Some(key) => {
                Self::new(&config.endpoint, &config.model, key, config.timeout()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl InsightProvider for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("AI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI service rejected request");
            return Err(ServiceError::ExternalServiceError(format!(
                "AI service error {}: {}",
                status.as_u16(),
                body
            )));
        }

        let data: GenerateContentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("AI response was not understood: {}", e))
        })?;

        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ServiceError::ExternalServiceError(
                "AI service returned no text".to_string(),
            ));
        }
        debug!(chars = text.len(), "AI reply received");
        Ok(text)
    }
}

/// One line per row: `product | qty=.. | days_remaining=.. | price=..`
pub fn inventory_listing(batch: &InventoryBatch) -> String {
    batch
        .iter()
        .map(|row| {
            format!(
                "{} | qty={} | days_remaining={} | price={}",
                row.product.as_deref().unwrap_or(NO_PRODUCT),
                row.field(QUANTITY_COLUMN).unwrap_or_default(),
                row.days_remaining,
                row.field(PRICE_COLUMN).unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn insight_schema() -> Value {
    json!({
        "title": "Inventory QA extraction",
        "type": "object",
        "properties": {
            "key_fields": {
                "type": "array",
                "description": "Top 5 key items or fields relevant to the question",
                "items": {
                    "type": "object",
                    "properties": {
                        "field_name": {"type": "string"},
                        "value": {"type": "string"},
                        "reason": {"type": "string"}
                    }
                }
            },
            "summary": {"type": "string"},
            "risk_score": {"type": "integer"},
            "recommended_action": {"type": "string"}
        },
        "required": ["key_fields", "summary"]
    })
}

pub fn build_prompt(question: &str, batch: &InventoryBatch) -> String {
    format!(
        "You are an inventory analyst. The user question is:\n\
         Question: {}\n\n\
         Inventory (one product per line):\n\
         {}\n\n\
         Return JSON that conforms to this schema:\n\
         {}\n",
        question.trim(),
        inventory_listing(batch),
        insight_schema()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyField {
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub reason: String,
}

/// Typed view of a schema-conforming reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub key_fields: Vec<KeyField>,
    pub summary: String,
    #[serde(default)]
    pub risk_score: Option<i64>,
    #[serde(default)]
    pub recommended_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub provider: String,
    pub raw: String,
    /// Reply parsed as JSON, when it was JSON
    pub json: Option<Value>,
    /// Reply parsed against the schema, when it conformed
    pub report: Option<InsightReport>,
}

/// Strip a Markdown code fence (```json ... ```) if the reply is wrapped in one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_insight(provider: &str, raw: String) -> Insight {
    let json: Option<Value> = serde_json::from_str(strip_code_fence(&raw)).ok();
    let report = json
        .as_ref()
        .and_then(|value| serde_json::from_value::<InsightReport>(value.clone()).ok());

    if json.is_none() {
        debug!("AI reply is not JSON; keeping raw text");
    }
    Insight {
        provider: provider.to_string(),
        raw,
        json,
        report,
    }
}

/// Ask one question about a batch.
#[instrument(skip(provider, batch), fields(provider_name = provider.name(), rows = batch.len()))]
pub async fn ask_question(
    provider: &dyn InsightProvider,
    question: &str,
    batch: &InventoryBatch,
) -> Result<Insight, ServiceError> {
    if question.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "question must not be empty".to_string(),
        ));
    }

    let prompt = build_prompt(question, batch);
    let raw = provider.generate(&prompt).await?;
    let insight = parse_insight(provider.name(), raw);
    info!(
        structured = insight.report.is_some(),
        "inventory question answered"
    );
    Ok(insight)
}
