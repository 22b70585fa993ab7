//! Prometheus metrics for the notification pipeline.

use prometheus::{Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};
use repo_notifier_core::monitoring::{Ingress, MetricsCollector};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Service metrics for observability
///
/// Each instance owns its registry so that several services, or several
/// tests, can live in one process.
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    pub messages_received_total: IntCounterVec,
    pub malformed_payloads_total: IntCounter,
    pub notifications_skipped_total: IntCounter,
    pub notifications_delivered_total: IntCounter,
    pub delivery_failures_total: IntCounter,
    pub delivery_duration_seconds: Histogram,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        use prometheus::{
            register_histogram_with_registry, register_int_counter_vec_with_registry,
            register_int_counter_with_registry,
        };

        let registry = Registry::new();

        Ok(Arc::new(Self {
            messages_received_total: register_int_counter_vec_with_registry!(
                "repo_notifier_messages_received_total",
                "Queue messages received, by ingress",
                &["ingress"],
                registry
            )?,
            malformed_payloads_total: register_int_counter_with_registry!(
                "repo_notifier_malformed_payloads_total",
                "Payloads discarded because they could not be decoded",
                registry
            )?,
            notifications_skipped_total: register_int_counter_with_registry!(
                "repo_notifier_notifications_skipped_total",
                "Ref updates that produced no notification",
                registry
            )?,
            notifications_delivered_total: register_int_counter_with_registry!(
                "repo_notifier_notifications_delivered_total",
                "Notifications accepted by the webhook",
                registry
            )?,
            delivery_failures_total: register_int_counter_with_registry!(
                "repo_notifier_delivery_failures_total",
                "Notifications the webhook did not accept",
                registry
            )?,
            delivery_duration_seconds: register_histogram_with_registry!(
                "repo_notifier_delivery_duration_seconds",
                "Webhook delivery time distribution",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
                registry
            )?,
            registry,
        }))
    }

    /// Registry holding every metric of this instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl MetricsCollector for ServiceMetrics {
    fn record_message_received(&self, ingress: Ingress) {
        self.messages_received_total
            .with_label_values(&[ingress.as_str()])
            .inc();
    }

    fn record_malformed_payload(&self) {
        self.malformed_payloads_total.inc();
    }

    fn record_notification_skipped(&self) {
        self.notifications_skipped_total.inc();
    }

    fn record_delivery(&self, duration: Duration, success: bool) {
        self.delivery_duration_seconds
            .observe(duration.as_secs_f64());
        if success {
            self.notifications_delivered_total.inc();
        } else {
            self.delivery_failures_total.inc();
        }
    }
}
