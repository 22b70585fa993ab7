//! Google Cloud Pub/Sub provider implementation.
//!
//! This module talks to the Pub/Sub v1 REST API directly over HTTPS:
//!
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:pull`
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:acknowledge`
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:modifyAckDeadline`
//! - `GET  /v1/projects/{project}/subscriptions/{subscription}`
//!
//! Rejecting a message sets its ack deadline to zero, which makes Pub/Sub
//! redeliver it immediately. A pulled message whose data is not valid base64
//! can never be processed; it is acknowledged on the spot and left out of the
//! returned batch.
//!
//! ## Authentication
//!
//! Bearer tokens come from a [`TokenSource`]: the metadata server, a service
//! account key, a static token, or nothing at all when the endpoint points at
//! the local emulator.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::providers::PubSubProvider;
//! use queue_runtime::{PubSubAuthMethod, PubSubConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = PubSubConfig::new("my-project");
//! config.endpoint = "http://localhost:8085".to_string();
//! config.auth = PubSubAuthMethod::Emulator;
//!
//! let provider = PubSubProvider::new(config)?;
//! # Ok(())
//! # }
//! ```

use super::gcp_auth::{token_source_for, TokenSource};
use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{MessageId, ReceiptHandle, ReceivedMessage, SubscriptionName, Timestamp};
use crate::provider::{ProviderType, PubSubConfig};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;

const PROVIDER_NAME: &str = "GooglePubSub";

// ============================================================================
// Error Types
// ============================================================================

/// Pub/Sub specific errors
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}")]
    Timeout(Duration),

    #[error("Pub/Sub service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Response could not be parsed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PubSubError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::PermissionDenied(_) => false,
            Self::SubscriptionNotFound(_) => false,
            Self::NetworkError(_) => true,
            Self::Timeout(_) => true,
            Self::ServiceError { .. } => true,
            Self::InvalidReceipt(_) => false,
            Self::ConfigurationError(_) => false,
            Self::Json(_) => false,
        }
    }

    /// Map Pub/Sub error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::PermissionDenied(operation) => QueueError::PermissionDenied { operation },
            Self::SubscriptionNotFound(subscription) => {
                QueueError::SubscriptionNotFound { subscription }
            }
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::ServiceError { status, message } => QueueError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                code: status.to_string(),
                message,
            },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::ConfigurationError(message) => QueueError::InvalidConfiguration { message },
            Self::Json(e) => QueueError::InvalidResponse(e),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: WirePubsubMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePubsubMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [&'a str],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: [&'a str; 1],
    ack_deadline_seconds: i32,
}

// ============================================================================
// PubSubProvider
// ============================================================================

/// Google Cloud Pub/Sub queue provider
///
/// The provider is thread-safe and can be shared across async tasks. Token
/// caching is handled inside the configured [`TokenSource`].
pub struct PubSubProvider {
    http_client: HttpClient,
    config: PubSubConfig,
    token_source: Arc<dyn TokenSource>,
}

impl PubSubProvider {
    /// Create new Pub/Sub provider
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Project ID or endpoint is empty
    /// - The HTTP client cannot be built
    /// - A configured service account key cannot be loaded
    pub fn new(config: PubSubConfig) -> Result<Self, PubSubError> {
        if config.project_id.trim().is_empty() {
            return Err(PubSubError::ConfigurationError(
                "Project ID cannot be empty".to_string(),
            ));
        }

        if config.endpoint.trim().is_empty() {
            return Err(PubSubError::ConfigurationError(
                "Endpoint cannot be empty".to_string(),
            ));
        }

        let request_timeout = config
            .request_timeout
            .to_std()
            .map_err(|e| PubSubError::ConfigurationError(format!("Invalid request timeout: {}", e)))?;

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PubSubError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let token_source = token_source_for(&config.auth, http_client.clone())?;

        Ok(Self::with_token_source(http_client, config, token_source))
    }

    /// Create provider with an explicit token source
    pub fn with_token_source(
        http_client: HttpClient,
        config: PubSubConfig,
        token_source: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http_client,
            config,
            token_source,
        }
    }

    fn subscription_url(&self, subscription: &str) -> String {
        format!(
            "{}/v1/projects/{}/subscriptions/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project_id,
            subscription
        )
    }

    /// Send a request with authentication and map the response status
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        subscription: &str,
        operation: &str,
        timeout: Option<Duration>,
    ) -> Result<String, PubSubError> {
        let mut request = request;
        if let Some(token) = self.token_source.access_token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(std_timeout) = timeout.and_then(|t| t.to_std().ok()) {
            request = request.timeout(std_timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PubSubError::Timeout(timeout.unwrap_or(self.config.request_timeout))
            } else if e.is_connect() {
                PubSubError::NetworkError(format!("Connection failed: {}", e))
            } else {
                PubSubError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PubSubError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        Err(match status {
            StatusCode::UNAUTHORIZED => PubSubError::Authentication(body),
            StatusCode::FORBIDDEN => PubSubError::PermissionDenied(format!(
                "{} on subscription '{}'",
                operation, subscription
            )),
            StatusCode::NOT_FOUND => PubSubError::SubscriptionNotFound(subscription.to_string()),
            StatusCode::BAD_REQUEST if operation != "pull" => PubSubError::InvalidReceipt(body),
            _ => PubSubError::ServiceError {
                status: status.as_u16(),
                message: body,
            },
        })
    }

    async fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, PubSubError> {
        let url = format!("{}:pull", self.subscription_url(subscription.as_str()));
        let request = self
            .http_client
            .post(&url)
            .json(&PullRequest { max_messages });

        let body = match self
            .send(request, subscription.as_str(), "pull", Some(timeout))
            .await
        {
            Ok(body) => body,
            // A long poll that ends without messages is not a failure.
            Err(PubSubError::Timeout(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let response: PullResponse = if body.trim().is_empty() {
            PullResponse::default()
        } else {
            serde_json::from_str(&body)?
        };

        let delivered_at = Timestamp::now();
        let expires_at =
            Timestamp::from_datetime(delivered_at.as_datetime() + self.config.ack_deadline);

        let mut messages = Vec::with_capacity(response.received_messages.len());
        let mut undecodable = Vec::new();

        for wire in response.received_messages {
            let body = match base64::engine::general_purpose::STANDARD
                .decode(wire.message.data.as_bytes())
            {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(
                        message_id = %wire.message.message_id,
                        error = %e,
                        "Message data is not valid base64, acknowledging without processing"
                    );
                    undecodable.push(wire.ack_id);
                    continue;
                }
            };

            let message_id = wire
                .message
                .message_id
                .parse::<MessageId>()
                .unwrap_or_default();

            messages.push(ReceivedMessage {
                message_id,
                body: Bytes::from(body),
                attributes: wire.message.attributes,
                receipt_handle: ReceiptHandle::for_subscription(
                    subscription,
                    &wire.ack_id,
                    expires_at.clone(),
                    ProviderType::GooglePubSub,
                ),
                delivery_count: wire.delivery_attempt.unwrap_or(1),
                published_at: wire
                    .message
                    .publish_time
                    .map(Timestamp::from_datetime)
                    .unwrap_or_else(|| delivered_at.clone()),
                delivered_at: delivered_at.clone(),
            });
        }

        if !undecodable.is_empty() {
            let ack_ids: Vec<&str> = undecodable.iter().map(String::as_str).collect();
            // Left unacknowledged, these come back after the ack deadline.
            if let Err(e) = self.acknowledge_ids(subscription.as_str(), &ack_ids).await {
                tracing::warn!(
                    error = %e,
                    count = ack_ids.len(),
                    "Failed to acknowledge undecodable messages"
                );
            }
        }

        Ok(messages)
    }

    fn receipt_parts<'a>(&self, receipt: &'a ReceiptHandle) -> Result<(&'a str, &'a str), PubSubError> {
        if receipt.provider_type() != ProviderType::GooglePubSub {
            return Err(PubSubError::InvalidReceipt(receipt.handle().to_string()));
        }
        receipt
            .parts()
            .ok_or_else(|| PubSubError::InvalidReceipt(receipt.handle().to_string()))
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), PubSubError> {
        let (subscription, ack_id) = self.receipt_parts(receipt)?;
        self.acknowledge_ids(subscription, &[ack_id]).await
    }

    async fn acknowledge_ids(&self, subscription: &str, ack_ids: &[&str]) -> Result<(), PubSubError> {
        let url = format!("{}:acknowledge", self.subscription_url(subscription));
        let request = self
            .http_client
            .post(&url)
            .json(&AcknowledgeRequest { ack_ids });

        self.send(request, subscription, "acknowledge", None).await?;
        Ok(())
    }

    async fn reject(&self, receipt: &ReceiptHandle) -> Result<(), PubSubError> {
        let (subscription, ack_id) = self.receipt_parts(receipt)?;
        let url = format!("{}:modifyAckDeadline", self.subscription_url(subscription));
        let request = self.http_client.post(&url).json(&ModifyAckDeadlineRequest {
            ack_ids: [ack_id],
            ack_deadline_seconds: 0,
        });

        self.send(request, subscription, "modifyAckDeadline", None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QueueProvider for PubSubProvider {
    async fn receive_messages(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let messages = self
            .pull(subscription, max_messages, timeout)
            .await
            .map_err(|e| e.to_queue_error())?;

        if !messages.is_empty() {
            tracing::debug!(
                subscription = %subscription,
                count = messages.len(),
                "Pulled messages from Pub/Sub"
            );
        }

        Ok(messages)
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.acknowledge(receipt)
            .await
            .map_err(|e| e.to_queue_error())
    }

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.reject(receipt).await.map_err(|e| e.to_queue_error())
    }

    async fn check_subscription(
        &self,
        subscription: &SubscriptionName,
    ) -> Result<(), QueueError> {
        let request = self
            .http_client
            .get(self.subscription_url(subscription.as_str()));

        self.send(request, subscription.as_str(), "get", None)
            .await
            .map_err(|e| e.to_queue_error())?;
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::GooglePubSub
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::GooglePubSub.max_batch_size()
    }
}
