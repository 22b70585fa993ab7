//! Pub/Sub push endpoint.
//!
//! Pub/Sub delivers each message as a POST carrying a JSON wrapper:
//!
//! ```json
//! {
//!   "message": { "data": "<base64>", "messageId": "123", "attributes": {} },
//!   "subscription": "projects/p/subscriptions/s"
//! }
//! ```
//!
//! The endpoint answers `204 No Content` to every request, whatever happens
//! to the message. Requests that are not JSON POSTs are ignored, invalid
//! wrappers are logged and dropped, and valid ones are handed to the
//! [`MessageHandler`](repo_notifier_core::MessageHandler).

use crate::AppState;
use axum::{
    extract::{rejection::BytesRejection, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
};
use base64::Engine;
use bytes::Bytes;
use repo_notifier_core::{
    monitoring::{Ingress, MetricsCollector},
    AckDecision,
};
use serde::Deserialize;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;

/// Reasons a push request is not processed
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Unsupported method {0}")]
    UnsupportedMethod(Method),

    #[error("Unsupported media type '{0}'")]
    UnsupportedMediaType(String),

    #[error("Verification token missing or incorrect")]
    InvalidToken,

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Invalid push wrapper: {0}")]
    InvalidWrapper(#[source] serde_json::Error),

    #[error("Push message has no subscription")]
    MissingSubscription,

    #[error("Push message has no data")]
    MissingData,

    #[error("Push message data is not valid base64: {0}")]
    InvalidData(#[from] base64::DecodeError),

    #[error("Failed to re-encode push message data: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl PushError {
    /// Whether the request was never meant for this endpoint
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMethod(_) | Self::UnsupportedMediaType(_)
        )
    }
}

/// Wrapper posted by Pub/Sub
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub message: PushMessage,

    #[serde(default)]
    pub subscription: String,
}

/// Message inside a push wrapper
///
/// Pub/Sub sends the id under both `messageId` and `message_id`; the
/// emulator and older clients use `id`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PushMessage {
    pub data: Option<PushData>,

    id: Option<String>,

    #[serde(rename = "messageId")]
    message_id_camel: Option<String>,

    message_id: Option<String>,

    pub attributes: HashMap<String, String>,

    #[serde(rename = "publishTime")]
    pub publish_time: Option<String>,
}

impl PushMessage {
    /// Message id, whichever spelling carried it
    pub fn id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.message_id_camel.as_deref())
            .or(self.message_id.as_deref())
            .unwrap_or("")
    }
}

/// Message data, base64 encoded or embedded as JSON
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PushData {
    Encoded(String),
    Json(serde_json::Value),
}

impl PushData {
    /// Raw payload bytes
    pub fn into_payload(self) -> Result<Vec<u8>, PushError> {
        match self {
            Self::Encoded(data) => Ok(base64::engine::general_purpose::STANDARD.decode(data)?),
            Self::Json(value) => serde_json::to_vec(&value).map_err(PushError::Serialization),
        }
    }
}

/// A push request that passed every check
#[derive(Debug)]
pub struct AcceptedPush {
    pub subscription: String,
    pub message_id: String,
    pub payload: Vec<u8>,
}

/// Handle a push request
#[instrument(skip_all, fields(subscription, message_id))]
pub async fn handle_push(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let expected_token = state
        .config
        .push
        .verification_token
        .as_ref()
        .map(|token| token.expose_secret());

    match accept_push(&method, query.as_deref(), &headers, body, expected_token) {
        Ok(push) => {
            let span = tracing::Span::current();
            span.record("subscription", push.subscription.as_str());
            span.record("message_id", push.message_id.as_str());

            info!("Received push message");
            state.metrics.record_message_received(Ingress::Push);

            match state.handler.handle(&push.payload).await {
                AckDecision::Ack => debug!("Push message handled"),
                AckDecision::Nack => warn!("Push message processing failed and will not be retried"),
            }
        }
        Err(e) if e.is_ignored() => debug!(error = %e, "Ignoring push request"),
        Err(e) => warn!(error = %e, "Discarding invalid push request"),
    }

    StatusCode::NO_CONTENT
}

/// Run the request checks and unwrap the message payload
pub fn accept_push(
    method: &Method,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
    expected_token: Option<&str>,
) -> Result<AcceptedPush, PushError> {
    if *method != Method::POST {
        return Err(PushError::UnsupportedMethod(method.clone()));
    }

    let media_type = media_type(headers);
    if !media_type.eq_ignore_ascii_case("application/json") {
        return Err(PushError::UnsupportedMediaType(media_type));
    }

    if let Some(expected) = expected_token {
        let provided = query.and_then(token_param).unwrap_or_default();
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(PushError::InvalidToken);
        }
    }

    let body = body.map_err(|e| PushError::Body(e.body_text()))?;
    let request: PushRequest = serde_json::from_slice(&body).map_err(PushError::InvalidWrapper)?;

    if request.subscription.is_empty() {
        return Err(PushError::MissingSubscription);
    }

    let message_id = request.message.id().to_string();
    let payload = request
        .message
        .data
        .ok_or(PushError::MissingData)?
        .into_payload()?;

    Ok(AcceptedPush {
        subscription: request.subscription,
        message_id,
        payload,
    })
}

/// Media type of the request without parameters
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn token_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}
