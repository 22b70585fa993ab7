//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory subscription that:
//! - Delivers published messages in FIFO order
//! - Locks delivered messages until acknowledged or the ack deadline passes
//! - Puts rejected messages back at the front of the subscription
//! - Provides thread-safe concurrent access
//!
//! The provider is cheap to clone; clones share the same storage so a test can
//! publish into the same subscriptions that a client is pulling from.

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{
    Message, MessageId, ReceiptHandle, ReceivedMessage, SubscriptionName, Timestamp,
};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Interval between storage checks while waiting for messages
const POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all subscriptions
struct SubscriptionStorage {
    subscriptions: HashMap<SubscriptionName, InMemorySubscription>,
    config: InMemoryConfig,
}

impl SubscriptionStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            subscriptions: HashMap::new(),
            config,
        }
    }

    /// Get or create a subscription
    fn get_or_create(&mut self, name: &SubscriptionName) -> &mut InMemorySubscription {
        self.subscriptions
            .entry(name.clone())
            .or_insert_with(InMemorySubscription::new)
    }
}

/// Internal state for a single subscription
struct InMemorySubscription {
    /// Messages waiting for delivery (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// Delivered messages awaiting acknowledgement, keyed by ack token
    in_flight: HashMap<String, InFlightMessage>,
    acknowledged: u64,
    abandoned: u64,
}

impl InMemorySubscription {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            acknowledged: 0,
            abandoned: 0,
        }
    }

    /// Return messages whose lock has lapsed to the front of the subscription
    fn requeue_expired(&mut self) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.is_expired())
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            if let Some(in_flight) = self.in_flight.remove(&token) {
                self.messages.push_front(in_flight.message);
            }
        }
    }
}

/// A message stored in the subscription with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    published_at: Timestamp,
    delivery_count: u32,
}

impl StoredMessage {
    fn from_message(message: Message) -> Self {
        Self {
            message_id: MessageId::new(),
            body: message.body,
            attributes: message.attributes,
            published_at: Timestamp::now(),
            delivery_count: 0,
        }
    }
}

/// A message currently being processed
struct InFlightMessage {
    message: StoredMessage,
    lock_expires_at: Timestamp,
}

impl InFlightMessage {
    fn is_expired(&self) -> bool {
        Timestamp::now() >= self.lock_expires_at
    }
}

/// Snapshot of a subscription's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Messages waiting for delivery
    pub pending: usize,
    /// Messages delivered but not yet acknowledged
    pub in_flight: usize,
    /// Messages acknowledged since creation
    pub acknowledged: u64,
    /// Messages rejected for redelivery since creation
    pub abandoned: u64,
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<SubscriptionStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(SubscriptionStorage::new(config))),
        }
    }

    /// Publish a message into a subscription
    pub fn publish(
        &self,
        subscription: &SubscriptionName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.write_storage()?;
        let max_queue_size = storage.config.max_queue_size;
        let entry = storage.get_or_create(subscription);

        if entry.messages.len() + entry.in_flight.len() >= max_queue_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "QueueFull".to_string(),
                message: format!(
                    "subscription '{}' holds the maximum of {} messages",
                    subscription, max_queue_size
                ),
            });
        }

        let stored = StoredMessage::from_message(message);
        let message_id = stored.message_id.clone();
        entry.messages.push_back(stored);
        Ok(message_id)
    }

    /// Get counters for a subscription
    pub fn stats(&self, subscription: &SubscriptionName) -> Result<SubscriptionStats, QueueError> {
        let mut storage = self.write_storage()?;
        let stats = match storage.subscriptions.get_mut(subscription) {
            Some(entry) => {
                entry.requeue_expired();
                SubscriptionStats {
                    pending: entry.messages.len(),
                    in_flight: entry.in_flight.len(),
                    acknowledged: entry.acknowledged,
                    abandoned: entry.abandoned,
                }
            }
            None => SubscriptionStats::default(),
        };
        Ok(stats)
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, SubscriptionStorage>, QueueError> {
        self.storage.write().map_err(|_| QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "LockPoisoned".to_string(),
            message: "in-memory storage lock was poisoned".to_string(),
        })
    }

    /// Take up to `max_messages` available messages and lock them
    fn take_available(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut storage = self.write_storage()?;
        let ack_deadline = storage.config.ack_deadline;
        let entry = storage.get_or_create(subscription);
        entry.requeue_expired();

        let mut received = Vec::new();
        while received.len() < max_messages as usize {
            let Some(mut stored) = entry.messages.pop_front() else {
                break;
            };

            stored.delivery_count += 1;
            let now = Timestamp::now();
            let lock_expires_at = Timestamp::from_datetime(now.as_datetime() + ack_deadline);
            let ack_token = uuid::Uuid::new_v4().to_string();

            received.push(ReceivedMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                attributes: stored.attributes.clone(),
                receipt_handle: ReceiptHandle::for_subscription(
                    subscription,
                    &ack_token,
                    lock_expires_at.clone(),
                    ProviderType::InMemory,
                ),
                delivery_count: stored.delivery_count,
                published_at: stored.published_at.clone(),
                delivered_at: now,
            });

            entry.in_flight.insert(
                ack_token,
                InFlightMessage {
                    message: stored,
                    lock_expires_at,
                },
            );
        }

        Ok(received)
    }

    /// Remove an in-flight message, returning it with its subscription entry
    fn settle<F>(&self, receipt: &ReceiptHandle, apply: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut InMemorySubscription, StoredMessage),
    {
        let not_found = || QueueError::MessageNotFound {
            receipt: receipt.handle().to_string(),
        };

        let (subscription, token) = receipt.parts().ok_or_else(not_found)?;
        let subscription =
            SubscriptionName::new(subscription.to_string()).map_err(|_| not_found())?;

        let mut storage = self.write_storage()?;
        let entry = storage
            .subscriptions
            .get_mut(&subscription)
            .ok_or_else(not_found)?;

        let in_flight = entry.in_flight.remove(token).ok_or_else(not_found)?;
        if in_flight.is_expired() {
            // Lock lapsed; the message is due for redelivery anyway.
            entry.messages.push_front(in_flight.message);
            return Err(not_found());
        }

        apply(entry, in_flight.message);
        Ok(())
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn receive_messages(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Timestamp::from_datetime(Timestamp::now().as_datetime() + timeout);

        loop {
            let received = self.take_available(subscription, max_messages)?;
            if !received.is_empty() || Timestamp::now() >= deadline {
                return Ok(received);
            }

            tokio::time::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.settle(receipt, |entry, _message| {
            entry.acknowledged += 1;
        })
    }

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.settle(receipt, |entry, message| {
            entry.abandoned += 1;
            entry.messages.push_front(message);
        })
    }

    async fn check_subscription(
        &self,
        _subscription: &SubscriptionName,
    ) -> Result<(), QueueError> {
        // Subscriptions are created on first use.
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::InMemory.max_batch_size()
    }
}
