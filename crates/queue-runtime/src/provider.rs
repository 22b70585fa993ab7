//! Provider types and configuration.

use chrono::Duration;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroize;

/// Default public endpoint for the Pub/Sub REST API
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    GooglePubSub,
    InMemory,
}

impl ProviderType {
    /// Get maximum number of messages returned by one receive call
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::GooglePubSub => 1000,
            Self::InMemory => 100,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GooglePubSub => write!(f, "GooglePubSub"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub provider: ProviderConfig,
    pub default_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::InMemory(InMemoryConfig::default()),
            default_timeout: Duration::seconds(30),
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    GooglePubSub(PubSubConfig),
    InMemory(InMemoryConfig),
}

/// Google Cloud Pub/Sub configuration
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Project owning the subscription
    pub project_id: String,
    /// REST endpoint, overridden for the emulator
    pub endpoint: String,
    /// How access tokens are obtained
    pub auth: PubSubAuthMethod,
    /// Ack deadline configured on the subscription, used for receipt expiry
    pub ack_deadline: Duration,
    /// Upper bound for a single REST call (pull is a long poll)
    pub request_timeout: Duration,
}

impl PubSubConfig {
    /// Create configuration for a project with default settings
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            auth: PubSubAuthMethod::default(),
            ack_deadline: Duration::seconds(10),
            request_timeout: Duration::seconds(60),
        }
    }
}

/// Source of OAuth2 access tokens for the Pub/Sub API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PubSubAuthMethod {
    /// Compute metadata server (GCE, GKE, Cloud Run)
    #[default]
    MetadataServer,
    /// Pre-issued bearer token
    AccessToken { token: SecretString },
    /// Service account JSON key file
    ServiceAccountKey { path: PathBuf },
    /// Local emulator, no authentication
    Emulator,
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub max_queue_size: usize,
    pub ack_deadline: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
            ack_deadline: Duration::seconds(10),
        }
    }
}

/// String holding a credential
///
/// Never shown in Debug output and wiped from memory on drop.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretString")
            .field("length", &self.0.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
