//! Webhook delivery.
//!
//! Messages are posted once, as JSON, with a bounded timeout. There is no retry
//! at this level; redelivery is left to the queue.

use crate::slack::SlackMessage;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;

/// Default bound on a single webhook request
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response body kept in an error
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Reasons a delivery failed
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Webhook responded with HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Webhook request failed: {message}")]
    Transport { message: String, timeout: bool },

    #[error("Message could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    /// HTTP status of the response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the request ran into its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }
}

/// Outcome of a delivery that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The destination accepted the message
    Sent,
    /// No destination is configured and the message was dropped
    Disabled,
}

/// Destination for formatted notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message
    async fn deliver(&self, message: &SlackMessage) -> Result<DeliveryStatus, DeliveryError>;
}

/// Slack incoming-webhook client
#[derive(Debug, Clone)]
pub struct SlackWebhookClient {
    http_client: HttpClient,
    webhook_url: String,
    timeout: Duration,
}

impl SlackWebhookClient {
    /// Create client for a webhook URL
    ///
    /// An empty URL disables delivery: every call returns
    /// [`DeliveryStatus::Disabled`] without a request.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_http_client(HttpClient::new(), webhook_url, timeout)
    }

    /// Create client reusing an existing HTTP client
    pub fn with_http_client(
        http_client: HttpClient,
        webhook_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            webhook_url: webhook_url.into(),
            timeout,
        }
    }

    /// Check whether a destination is configured
    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl NotificationSink for SlackWebhookClient {
    async fn deliver(&self, message: &SlackMessage) -> Result<DeliveryStatus, DeliveryError> {
        if !self.is_enabled() {
            debug!("No webhook URL configured, dropping notification");
            return Ok(DeliveryStatus::Disabled);
        }

        let body = serde_json::to_vec(message)?;

        let response = self
            .http_client
            .post(&self.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                message: e.to_string(),
                timeout: e.is_timeout(),
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(DeliveryStatus::Sent);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::UnexpectedStatus {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}
