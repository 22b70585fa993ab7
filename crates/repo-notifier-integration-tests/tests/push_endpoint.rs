//! Push endpoint tests running the real pipeline behind the router.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::*;
use repo_notifier_api::{create_router, serve};
use tokio::net::TcpListener;
use tower::ServiceExt; // For `oneshot`

fn json_post(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

/// Verify a pushed CREATE event reaches Slack and the caller gets 204.
#[tokio::test]
async fn test_push_delivers_notification() {
    let slack = slack_webhook(200).await;
    let (state, metrics) = push_state(&webhook_url(&slack));

    let response = create_router(state)
        .oneshot(json_post(push_wrapper(CREATE_PAYLOAD)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let messages = received_messages(&slack).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].attachments[0].title_link,
        "https://source.cloud.google.com/p1/r1/+/abc123"
    );
    assert_eq!(
        metrics
            .messages_received_total
            .with_label_values(&["push"])
            .get(),
        1
    );
    assert_eq!(metrics.notifications_delivered_total.get(), 1);
}

/// Verify a Slack failure is only logged; the caller still gets 204.
#[tokio::test]
async fn test_push_delivery_failure_still_returns_204() {
    let slack = slack_webhook(500).await;
    let (state, metrics) = push_state(&webhook_url(&slack));

    let response = create_router(state)
        .oneshot(json_post(push_wrapper(CREATE_PAYLOAD)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(received_messages(&slack).await.len(), 1);
    assert_eq!(metrics.delivery_failures_total.get(), 1);
}

/// Verify a wrapper whose data is not a change event is dropped.
#[tokio::test]
async fn test_push_malformed_payload() {
    let slack = slack_webhook(200).await;
    let (state, metrics) = push_state(&webhook_url(&slack));

    let response = create_router(state)
        .oneshot(json_post(push_wrapper("definitely not json")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(received_messages(&slack).await.is_empty());
    assert_eq!(metrics.malformed_payloads_total.get(), 1);
}

/// Verify a wrapper without subscription never reaches the pipeline.
#[tokio::test]
async fn test_push_without_subscription_is_discarded() {
    let slack = slack_webhook(200).await;
    let (state, metrics) = push_state(&webhook_url(&slack));

    let body = serde_json::json!({"message": {"data": "e30=", "messageId": "1"}}).to_string();
    let response = create_router(state).oneshot(json_post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(received_messages(&slack).await.is_empty());
    assert_eq!(
        metrics
            .messages_received_total
            .with_label_values(&["push"])
            .get(),
        0
    );
}

/// Verify a served endpoint handles a real HTTP request and shuts down.
#[tokio::test]
async fn test_served_endpoint() {
    let slack = slack_webhook(200).await;
    let (state, _metrics) = push_state(&webhook_url(&slack));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    let response = raw_post(address, push_wrapper(CREATE_PAYLOAD)).await;
    assert!(response.starts_with("HTTP/1.1 204"), "{response}");
    assert_eq!(received_messages(&slack).await.len(), 1);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

/// Send a raw HTTP/1.1 POST and return the response head
async fn raw_post(address: std::net::SocketAddr, body: String) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(address).await.unwrap();
    let request = format!(
        "POST / HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        address,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
