//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueProvider` trait
//! for different subscription backends.

pub mod gcp_auth;
pub mod memory;
pub mod pubsub;

pub use gcp_auth::{
    MetadataServerTokenSource, NoAuthTokenSource, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource, TokenSource,
};
pub use memory::{InMemoryProvider, SubscriptionStats};
pub use pubsub::{PubSubError, PubSubProvider};
