//! The event-to-notification pipeline.
//!
//! One payload flows through decode, map, format and deliver. Ref updates are
//! handled in key order and the first failed delivery stops the remaining
//! updates of that payload. Deliveries made before the failure stand.

use crate::delivery::{DeliveryError, DeliveryStatus, NotificationSink};
use crate::event::{decode_envelope, ChangeEnvelope, DecodeError};
use crate::mapping::map_ref_update;
use crate::monitoring::MetricsCollector;
use crate::slack::format_notification;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

/// Errors surfaced by the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Delivery failed for ref update '{ref_key}': {source}")]
    Delivery {
        ref_key: String,
        #[source]
        source: DeliveryError,
    },
}

impl PipelineError {
    /// Whether processing the same payload again could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery { .. })
    }
}

/// Counts from one processed payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub delivered: usize,
    pub skipped: usize,
    /// Notifications dropped because delivery is disabled
    pub dropped: usize,
}

/// Pipeline from raw payloads to delivered notifications
pub struct NotificationPipeline {
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<dyn MetricsCollector>,
}

impl NotificationPipeline {
    pub fn new(sink: Arc<dyn NotificationSink>, metrics: Arc<dyn MetricsCollector>) -> Self {
        Self { sink, metrics }
    }

    /// Decode a payload and deliver a notification for each notifiable ref update
    #[instrument(skip_all, fields(payload_bytes = payload.len()))]
    pub async fn process_payload(&self, payload: &[u8]) -> Result<ProcessingSummary, PipelineError> {
        let envelope = decode_envelope(payload).map_err(|e| {
            self.metrics.record_malformed_payload();
            e
        })?;

        self.process_envelope(&envelope).await
    }

    /// Deliver a notification for each notifiable ref update of an envelope
    #[instrument(skip_all, fields(resource = %envelope.name, ref_updates = envelope.ref_update_event.ref_updates.len()))]
    pub async fn process_envelope(
        &self,
        envelope: &ChangeEnvelope,
    ) -> Result<ProcessingSummary, PipelineError> {
        let mut summary = ProcessingSummary::default();

        for (ref_key, update) in &envelope.ref_update_event.ref_updates {
            let fact = match map_ref_update(envelope, update) {
                Ok(fact) => fact,
                Err(reason) => {
                    debug!(ref_key = %ref_key, reason = %reason, "Skipping ref update");
                    self.metrics.record_notification_skipped();
                    summary.skipped += 1;
                    continue;
                }
            };

            let message = format_notification(&fact);

            let started = Instant::now();
            match self.sink.deliver(&message).await {
                Ok(DeliveryStatus::Sent) => {
                    self.metrics.record_delivery(started.elapsed(), true);
                    debug!(ref_key = %ref_key, update_type = %fact.update_type, "Notification delivered");
                    summary.delivered += 1;
                }
                Ok(DeliveryStatus::Disabled) => {
                    debug!(ref_key = %ref_key, "Delivery disabled, notification dropped");
                    summary.dropped += 1;
                }
                Err(source) => {
                    self.metrics.record_delivery(started.elapsed(), false);
                    warn!(
                        ref_key = %ref_key,
                        delivered = summary.delivered,
                        error = %source,
                        "Notification delivery failed, abandoning remaining ref updates"
                    );
                    return Err(PipelineError::Delivery {
                        ref_key: ref_key.clone(),
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }
}
