//! Message types for subscription operations including core domain identifiers.

use crate::error::ValidationError;
use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated subscription name
///
/// Follows the Pub/Sub resource naming rules: 3-255 characters, starting with
/// a letter, containing only letters, digits and `-_.~+%`, and not starting
/// with `goog`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionName(String);

impl SubscriptionName {
    /// Create new subscription name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.len() < 3 || name.len() > 255 {
            return Err(ValidationError::OutOfRange {
                field: "subscription".to_string(),
                message: "must be 3-255 characters".to_string(),
            });
        }

        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidFormat {
                field: "subscription".to_string(),
                message: "must start with a letter".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '+' | '%'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "subscription".to_string(),
                message: "only ASCII letters, digits and -_.~+% allowed".to_string(),
            });
        }

        if name.to_ascii_lowercase().starts_with("goog") {
            return Err(ValidationError::InvalidFormat {
                field: "subscription".to_string(),
                message: "must not start with 'goog'".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get subscription name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be published into a subscription (in-memory provider only)
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
        }
    }
}

/// A message received from a subscription with processing metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    pub published_at: Timestamp,
    pub delivered_at: Timestamp,
}

/// Opaque token for acknowledging or rejecting received messages
///
/// The handle string has the form `{subscription}|{ack_token}` so that a
/// provider can route the acknowledgement without extra bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    expires_at: Timestamp,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String, expires_at: Timestamp, provider_type: ProviderType) -> Self {
        Self {
            handle,
            expires_at,
            provider_type,
        }
    }

    /// Build a receipt handle for an acknowledgement token within a subscription
    pub fn for_subscription(
        subscription: &SubscriptionName,
        ack_token: &str,
        expires_at: Timestamp,
        provider_type: ProviderType,
    ) -> Self {
        Self::new(
            format!("{}|{}", subscription.as_str(), ack_token),
            expires_at,
            provider_type,
        )
    }

    /// Split the handle into its subscription and acknowledgement token
    pub fn parts(&self) -> Option<(&str, &str)> {
        let (subscription, token) = self.handle.split_once('|')?;
        if subscription.is_empty() || token.is_empty() {
            return None;
        }
        Some((subscription, token))
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Whether the ack deadline has passed
    ///
    /// Settling an expired receipt is still attempted, but the provider may
    /// already have handed the message to another consumer.
    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }

    /// Get provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
