//! Queue message handling.
//!
//! Ingress adapters hand raw payloads to a [`MessageHandler`] and act on the
//! returned [`AckDecision`]. The decision rules are:
//!
//! | Outcome              | Decision |
//! |----------------------|----------|
//! | processed            | `Ack`    |
//! | malformed payload    | `Ack`    |
//! | delivery failed      | `Nack`   |

use crate::pipeline::{NotificationPipeline, PipelineError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// What to tell the queue about a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Remove the message from the subscription
    Ack,
    /// Ask for redelivery
    Nack,
}

/// Callback for messages received from a queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one payload and decide its fate
    async fn handle(&self, payload: &[u8]) -> AckDecision;
}

/// Handler running payloads through the notification pipeline
pub struct PipelineHandler {
    pipeline: Arc<NotificationPipeline>,
}

impl PipelineHandler {
    pub fn new(pipeline: Arc<NotificationPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl MessageHandler for PipelineHandler {
    async fn handle(&self, payload: &[u8]) -> AckDecision {
        match self.pipeline.process_payload(payload).await {
            Ok(summary) => {
                if summary.delivered > 0 {
                    info!(
                        delivered = summary.delivered,
                        skipped = summary.skipped,
                        "Notifications sent"
                    );
                } else {
                    debug!(
                        skipped = summary.skipped,
                        dropped = summary.dropped,
                        "No notifications sent"
                    );
                }
                AckDecision::Ack
            }
            Err(PipelineError::Decode(e)) => {
                warn!(error = %e, "Discarding malformed payload");
                AckDecision::Ack
            }
            Err(e) => {
                error!(error = %e, "Processing failed, requesting redelivery");
                AckDecision::Nack
            }
        }
    }
}
