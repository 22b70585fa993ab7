//! Common test utilities for repo-notifier integration tests
//!
//! This module provides:
//! - Change event payloads for the end-to-end scenarios
//! - A mocked Slack webhook
//! - Builders wiring the real pipeline to that webhook

#![allow(dead_code)]

use base64::Engine;
use repo_notifier_api::{AppState, ServiceConfig, ServiceMetrics, ServiceMode};
use repo_notifier_core::{
    MessageHandler, MetricsCollector, NotificationPipeline, PipelineHandler, SlackMessage,
    SlackWebhookClient,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mocked Slack webhook listens on
pub const WEBHOOK_PATH: &str = "/services/T000/B000/XXXX";

/// One CREATE on refs/heads/main
pub const CREATE_PAYLOAD: &str = r#"{
    "name": "projects/p1/repos/r1",
    "url": "https://source.developers.google.com/p/p1/r/r1",
    "eventTime": "2024-03-01T12:00:00Z",
    "refUpdateEvent": {
        "email": "a@b.com",
        "refUpdates": {
            "x": {"refName": "refs/heads/main", "updateType": "CREATE", "newId": "abc123"}
        }
    }
}"#;

/// One update with a classification nobody maps
pub const UNKNOWN_PAYLOAD: &str = r#"{
    "name": "projects/p1/repos/r1",
    "refUpdateEvent": {
        "email": "a@b.com",
        "refUpdates": {
            "x": {"refName": "refs/heads/main", "updateType": "UNKNOWN", "newId": "abc123"}
        }
    }
}"#;

/// Two notifiable updates, `a` sorting before `b`
pub const TWO_UPDATES_PAYLOAD: &str = r#"{
    "name": "projects/p1/repos/r1",
    "refUpdateEvent": {
        "email": "a@b.com",
        "refUpdates": {
            "b": {"refName": "refs/heads/second", "updateType": "DELETE", "oldId": "def456"},
            "a": {"refName": "refs/heads/first", "updateType": "UPDATE_FAST_FORWARD", "oldId": "111", "newId": "222"}
        }
    }
}"#;

/// Start a Slack webhook answering every post with `status`
pub async fn slack_webhook(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string("ok"))
        .mount(&server)
        .await;
    server
}

/// Full webhook URL of a mock server
pub fn webhook_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), WEBHOOK_PATH)
}

/// Slack messages the mock server has received, in arrival order
pub async fn received_messages(server: &MockServer) -> Vec<SlackMessage> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == WEBHOOK_PATH)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

/// Pipeline delivering to `webhook_url`
pub fn pipeline(webhook_url: &str, metrics: Arc<dyn MetricsCollector>) -> NotificationPipeline {
    let sink = SlackWebhookClient::new(webhook_url, Duration::from_secs(5));
    NotificationPipeline::new(Arc::new(sink), metrics)
}

/// Message handler delivering to `webhook_url`
pub fn handler(webhook_url: &str, metrics: Arc<dyn MetricsCollector>) -> Arc<dyn MessageHandler> {
    Arc::new(PipelineHandler::new(Arc::new(pipeline(webhook_url, metrics))))
}

/// Push-mode application state delivering to `webhook_url`
pub fn push_state(webhook_url: &str) -> (AppState, Arc<ServiceMetrics>) {
    let metrics = ServiceMetrics::new().unwrap();
    let config = ServiceConfig {
        mode: ServiceMode::Push,
        ..ServiceConfig::default()
    };
    let state = AppState::new(config, handler(webhook_url, metrics.clone()), metrics.clone());
    (state, metrics)
}

/// Pub/Sub push wrapper carrying `payload` as base64 data
pub fn push_wrapper(payload: &str) -> String {
    serde_json::json!({
        "message": {
            "data": base64::engine::general_purpose::STANDARD.encode(payload),
            "messageId": "1001",
            "message_id": "1001",
            "publishTime": "2024-03-01T12:00:01Z"
        },
        "subscription": "projects/p1/subscriptions/repo-events"
    })
    .to_string()
}

/// Poll a condition until it holds or five seconds pass
pub async fn wait_until<F, Fut>(condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
