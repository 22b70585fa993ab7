//! # Repo-Notifier Core
//!
//! Core logic for turning repository change events into chat notifications.
//!
//! A payload taken from a queue is decoded into a [`ChangeEnvelope`], each of
//! its ref updates is mapped to a [`NotificationFact`], rendered as a
//! [`SlackMessage`], and posted through a [`NotificationSink`]. Ingress
//! adapters drive the pipeline through the [`MessageHandler`] trait and turn
//! its [`AckDecision`] into queue acknowledgements.
//!
//! ## Module Organization
//!
//! - [event] - Change event model and decoder
//! - [mapping] - Ref update classification and notification facts
//! - [slack] - Slack message documents and formatter
//! - [delivery] - Webhook delivery client
//! - [pipeline] - Decode, map, format and deliver for one payload
//! - [handler] - Acknowledge/reject decisions for queue messages
//! - [subscriber] - Pull-subscription consumer loop
//! - [monitoring] - Metrics collection interface
//!
//! ## Usage
//!
//! ```rust
//! use repo_notifier_core::{format_notification, map_ref_update, decode_envelope};
//!
//! let payload = br#"{
//!     "name": "projects/p1/repos/r1",
//!     "refUpdateEvent": {
//!         "email": "a@b.com",
//!         "refUpdates": {"x": {"refName": "refs/heads/main", "updateType": "CREATE", "newId": "abc123"}}
//!     }
//! }"#;
//!
//! let envelope = decode_envelope(payload).unwrap();
//! let update = &envelope.ref_update_event.ref_updates["x"];
//! let fact = map_ref_update(&envelope, update).unwrap();
//! let message = format_notification(&fact);
//!
//! assert_eq!(message.attachments[0].title_link, "https://source.cloud.google.com/p1/r1/+/abc123");
//! ```

pub mod delivery;
pub mod event;
pub mod handler;
pub mod mapping;
pub mod monitoring;
pub mod pipeline;
pub mod slack;
pub mod subscriber;

pub use delivery::{
    DeliveryError, DeliveryStatus, NotificationSink, SlackWebhookClient, DEFAULT_DELIVERY_TIMEOUT,
};
pub use event::{decode_envelope, ChangeEnvelope, DecodeError, RefUpdate, RefUpdateEvent, UpdateType};
pub use handler::{AckDecision, MessageHandler, PipelineHandler};
pub use mapping::{map_ref_update, NotificationFact, SkipReason};
pub use monitoring::{Ingress, MetricsCollector, NoOpMetricsCollector};
pub use pipeline::{NotificationPipeline, PipelineError, ProcessingSummary};
pub use slack::{format_notification, Attachment, Field, SlackMessage};
pub use subscriber::PullSubscriber;
