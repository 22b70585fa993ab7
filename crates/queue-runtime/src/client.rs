//! Client traits and implementations for subscription operations.

use crate::error::QueueError;
use crate::message::{ReceiptHandle, ReceivedMessage, SubscriptionName};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{InMemoryProvider, PubSubProvider};
use async_trait::async_trait;
use chrono::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Main interface for subscription operations across all providers
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive single message from subscription
    async fn receive_message(
        &self,
        subscription: &SubscriptionName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Receive multiple messages from subscription
    async fn receive_messages(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Mark message as successfully processed (acknowledge)
    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError>;

    /// Return message to subscription for redelivery (reject)
    async fn abandon_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError>;

    /// Verify that the subscription exists and is reachable
    async fn check_subscription(&self, subscription: &SubscriptionName)
        -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Interface implemented by specific queue providers (Pub/Sub, in-memory)
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Receive multiple messages
    async fn receive_messages(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Complete message processing
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Abandon message for redelivery
    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Verify subscription existence
    async fn check_subscription(&self, subscription: &SubscriptionName)
        -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Get maximum batch size
    fn max_batch_size(&self) -> u32;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: QueueConfig) -> Result<Box<dyn QueueClient>, QueueError> {
        let client_config = config.clone();

        let provider: Box<dyn QueueProvider> = match config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Box::new(InMemoryProvider::new(in_memory_config))
            }
            ProviderConfig::GooglePubSub(pubsub_config) => Box::new(
                PubSubProvider::new(pubsub_config).map_err(|e| e.to_queue_error())?,
            ),
        };

        Ok(Box::new(StandardQueueClient::new(provider, client_config)))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Box<dyn QueueClient> {
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        let config = QueueConfig::default();
        Box::new(StandardQueueClient::new(Box::new(provider), config))
    }
}

/// Standard queue client implementation
pub struct StandardQueueClient {
    provider: Box<dyn QueueProvider>,
    config: QueueConfig,
}

impl StandardQueueClient {
    /// Create new standard queue client with provider
    pub fn new(provider: Box<dyn QueueProvider>, config: QueueConfig) -> Self {
        Self { provider, config }
    }

    /// Timeout applied when a caller passes a non-positive timeout
    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    fn effective_timeout(&self, timeout: Duration) -> Duration {
        if timeout <= Duration::zero() {
            self.config.default_timeout
        } else {
            timeout
        }
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    async fn receive_message(
        &self,
        subscription: &SubscriptionName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let messages = self
            .provider
            .receive_messages(subscription, 1, self.effective_timeout(timeout))
            .await?;
        Ok(messages.into_iter().next())
    }

    async fn receive_messages(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.clamp(1, self.provider.max_batch_size());
        self.provider
            .receive_messages(subscription, max_messages, self.effective_timeout(timeout))
            .await
    }

    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError> {
        self.provider.complete_message(&receipt).await
    }

    async fn abandon_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError> {
        self.provider.abandon_message(&receipt).await
    }

    async fn check_subscription(
        &self,
        subscription: &SubscriptionName,
    ) -> Result<(), QueueError> {
        self.provider.check_subscription(subscription).await
    }

    fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }
}
