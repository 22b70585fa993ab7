//! Error types for subscription operations.

use chrono::Duration;
use thiserror::Error;

/// Errors returned by queue clients and providers
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Subscription not found: {subscription}")]
    SubscriptionNotFound { subscription: String },

    /// The receipt is unknown, or its ack deadline passed and the message
    /// went back to the subscription
    #[error("Message not found or ack deadline passed: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Request timed out after {duration}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Provider response could not be decoded: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Invalid queue configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl QueueError {
    /// Whether repeating the same call later may succeed
    ///
    /// Missing subscriptions, rejected credentials and bad configuration stay
    /// broken until someone changes them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionFailed { .. } | Self::ProviderError { .. }
        )
    }
}

/// Identifier values rejected on construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
