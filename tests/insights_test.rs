mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{response_json, test_config, TestApp, TEN_ROW_CSV};
use dairy_waste_guard::{
    errors::ServiceError,
    services::insights::{GeminiClient, InsightProvider},
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(
        format!("{}/v1beta/", server.uri()),
        "gemini-1.5-pro",
        "test-key",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn reply(parts: &[&str]) -> serde_json::Value {
    let parts: Vec<_> = parts.iter().map(|text| json!({ "text": text })).collect();
    json!({
        "candidates": [{ "content": { "role": "model", "parts": parts } }]
    })
}

#[tokio::test]
async fn generate_posts_prompt_and_joins_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(reply(&["{\"summary\":", "\"ok\"}"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server).generate("hello").await.unwrap();
    assert_eq!(text, "{\"summary\":\"ok\"}");

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["contents"][0]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn error_status_is_external_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).generate("hello").await.unwrap_err();
    match err {
        ServiceError::ExternalServiceError(message) => {
            assert!(message.contains("429"));
            assert!(message.contains("quota exhausted"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_candidates_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client(&server).generate("hello").await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}

#[tokio::test]
async fn insights_endpoint_returns_structured_report() {
    let server = MockServer::start().await;
    let answer = json!({
        "key_fields": [
            { "field_name": "Skim Milk", "value": "1", "reason": "expires tomorrow" }
        ],
        "summary": "Discount skim milk and cream today.",
        "risk_score": 35,
        "recommended_action": "Run a same-day promotion"
    });
    let fenced = format!("```json\n{}\n```", answer);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&[fenced.as_str()])))
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn InsightProvider> = Arc::new(client(&server));
    let app = TestApp::with_insights(test_config(), provider);
    let response = app
        .post_json(
            "/api/v1/insights",
            &json!({ "question": "What should I discount?", "inventory_csv": TEN_ROW_CSV }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let report = &body["data"]["report"];
    assert_eq!(report["summary"], "Discount skim milk and cream today.");
    assert_eq!(report["key_fields"][0]["field_name"], "Skim Milk");
    assert_eq!(body["data"]["provider"], "gemini-1.5-pro");

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = sent["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("Question: What should I discount?"));
    assert!(prompt.contains("Skim Milk | qty=12 | days_remaining=1 | price=1.19"));
}

#[tokio::test]
async fn insights_endpoint_rejects_empty_question() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&["{}"])))
        .expect(0)
        .mount(&server)
        .await;

    let provider: Arc<dyn InsightProvider> = Arc::new(client(&server));
    let app = TestApp::with_insights(test_config(), provider);
    let response = app
        .post_json(
            "/api/v1/insights",
            &json!({ "question": "", "inventory_csv": TEN_ROW_CSV }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provider_failure_surfaces_as_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let provider: Arc<dyn InsightProvider> = Arc::new(client(&server));
    let app = TestApp::with_insights(test_config(), provider);
    let response = app
        .post_json(
            "/api/v1/insights",
            &json!({ "question": "Anything expiring?", "inventory_csv": TEN_ROW_CSV }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
