//! Dairy Waste Guard
//!
//! Screens dairy inventory uploads for stock close to expiry, produces the
//! risky-subset report, and forwards alerts to a workflow webhook or by mail.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod notifications;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::services::insights::{GeminiClient, InsightProvider};
use crate::services::waste_guard::WasteGuardService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub waste_guard: Arc<WasteGuardService>,
    /// `None` when no AI key is configured
    pub insights: Option<Arc<dyn InsightProvider>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        waste_guard: WasteGuardService,
        insights: Option<Arc<dyn InsightProvider>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            waste_guard: Arc::new(waste_guard),
            insights,
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, errors::ServiceError> {
        let waste_guard = WasteGuardService::from_config(&config)?;
        let insights = GeminiClient::from_config(&config.ai)?
            .map(|client| Arc::new(client) as Arc<dyn InsightProvider>);
        Ok(Self::new(config, waste_guard, insights))
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/assessments", post(handlers::assessments::create_assessment))
        .route(
            "/assessments/report",
            post(handlers::assessments::download_report),
        )
        .route("/insights", post(handlers::insights::ask_inventory_question))
}

/// Full application router with request-id, tracing, CORS and upload limits.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "dairy-waste-guard",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "alert_channels": state.waste_guard.channel_names(),
        "webhook_configured": state.config.webhook.url.is_some(),
        "ai_configured": state.insights.is_some(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
