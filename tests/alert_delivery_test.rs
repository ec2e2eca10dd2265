mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{response_json, test_config, TestApp, TEN_ROW_CSV};
use dairy_waste_guard::{
    models::{AlertPayload, InventoryRow},
    notifications::{AlertChannel, NotificationError},
    webhooks::AlertWebhookChannel,
};
use serde_json::Value;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn webhook_config(server: &MockServer) -> dairy_waste_guard::config::AppConfig {
    let mut config = test_config();
    config.webhook.url = Some(format!("{}/webhook/dairy", server.uri()));
    config
}

#[tokio::test]
async fn risky_upload_posts_payload_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/dairy"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({ "risk_score": 80 })))
        .respond_with(ResponseTemplate::new(200).set_body_string("Workflow was started"))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::from_config(webhook_config(&server));
    let response = app
        .post_csv("/api/v1/assessments?notify=true", TEN_ROW_CSV)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let delivery = &body["data"]["deliveries"][0];
    assert_eq!(delivery["channel"], "webhook");
    assert_eq!(delivery["delivered"], true);
    assert_eq!(delivery["detail"], "200 Workflow was started");

    let requests = server.received_requests().await.unwrap();
    let payload: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let items = payload["risky_items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product"], "Skim Milk");
    assert_eq!(items[0]["quantity"], 12);
    assert_eq!(items[0]["price"], 1.19);
    assert_eq!(items[0]["days_remaining"], 1);
    assert!(payload["alert_time"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn webhook_failure_is_reported_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow crashed"))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::from_config(webhook_config(&server));
    let response = app
        .post_csv("/api/v1/assessments?notify=true", TEN_ROW_CSV)
        .await;

    // The assessment itself still succeeds
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["risk_score"], 80);
    assert_eq!(body["data"]["deliveries"][0]["delivered"], false);
    assert_eq!(
        body["data"]["deliveries"][0]["detail"],
        "500 workflow crashed"
    );
}

#[tokio::test]
async fn healthy_upload_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::from_config(webhook_config(&server));
    let csv = "product,quantity,price,expiry_date\nAged Gouda,3,9.99,2099-01-01\n";
    let body = response_json(app.post_csv("/api/v1/assessments?notify=true", csv).await).await;

    assert_eq!(body["data"]["risk_score"], 100);
    assert_eq!(body["data"]["deliveries"], serde_json::json!([]));
}

#[tokio::test]
async fn slow_webhook_hits_client_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let channel =
        AlertWebhookChannel::new(Some(server.uri()), Duration::from_millis(200)).unwrap();
    let payload = AlertPayload {
        risk_score: 0,
        risky_items: vec![InventoryRow::with_days_remaining(0)],
        alert_time: "2024-05-01T00:00:00Z".into(),
    };

    let err = channel.deliver(&payload).await.unwrap_err();
    assert!(matches!(err, NotificationError::Transport(_)));
}
