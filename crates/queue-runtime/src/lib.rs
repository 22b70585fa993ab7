//! # Queue Runtime
//!
//! Provider-agnostic subscription runtime for pulling, acknowledging and
//! rejecting messages, with Google Cloud Pub/Sub and in-memory implementations.
//!
//! This library provides:
//! - Provider-agnostic receive, complete and abandon operations
//! - A Pub/Sub REST provider with metadata server, service account and emulator auth
//! - An in-memory provider for tests and local development
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [message] - Message structures and receipt handles
//! - [provider] - Provider types and configuration
//! - [client] - Client traits and implementations
//! - [providers] - Concrete provider implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{QueueError, ValidationError};
pub use message::{
    Message, MessageId, ReceiptHandle, ReceivedMessage, SubscriptionName, Timestamp,
};
pub use provider::{
    InMemoryConfig, ProviderConfig, ProviderType, PubSubAuthMethod, PubSubConfig, QueueConfig,
    SecretString, DEFAULT_PUBSUB_ENDPOINT,
};
pub use providers::{InMemoryProvider, PubSubProvider, SubscriptionStats};
