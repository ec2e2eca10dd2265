#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use dairy_waste_guard::{
    build_router, config::AppConfig, services::insights::InsightProvider,
    services::waste_guard::WasteGuardService, AppState,
};
use serde_json::Value;
use tower::ServiceExt;

/// In-process application harness; requests go through the full router
/// stack without binding a socket.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Application wired exactly as the server would wire it from `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let state = AppState::from_config(config).expect("failed to build app state");
        Self::with_state(state)
    }

    /// Application with default configuration: no webhook, no mail, no AI.
    pub fn new() -> Self {
        Self::from_config(test_config())
    }

    pub fn with_insights(config: AppConfig, provider: Arc<dyn InsightProvider>) -> Self {
        let waste_guard =
            WasteGuardService::from_config(&config).expect("failed to build alert channels");
        Self::with_state(AppState::new(config, waste_guard, Some(provider)))
    }

    fn with_state(state: AppState) -> Self {
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: impl Into<Body>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(body.into()).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn post_csv(&self, uri: &str, csv: &str) -> axum::response::Response {
        self.request(Method::POST, uri, Some("text/csv"), csv.to_string(), &[])
            .await
    }

    pub async fn post_json(&self, uri: &str, json: &Value) -> axum::response::Response {
        let body = serde_json::to_vec(json).expect("failed to serialize json request body");
        self.request(Method::POST, uri, Some("application/json"), body, &[])
            .await
    }

    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None, Body::empty(), &[])
            .await
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: "test".into(),
        ..AppConfig::default()
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&body).expect("response body was not json")
}

pub async fn response_text(response: axum::response::Response) -> String {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(body.to_vec()).expect("response body was not utf-8")
}

/// Ten rows, two of them within the risk window
pub const TEN_ROW_CSV: &str = "\
Product,Quantity,Price,Days_Remaining
Whole Milk,24,1.29,10
Skim Milk,12,1.19,1
Greek Yogurt,30,0.99,7
Butter,8,3.49,8
Cream,6,2.10,3
Cheddar,4,6.75,12
Parmesan,2,11.00,30
Kefir,10,2.49,5
Cottage Cheese,9,2.89,6
Sour Cream,7,1.79,9
";
