//! Metrics collection for the notification pipeline.
//!
//! The core only defines what is measured. The API crate provides a
//! Prometheus-backed implementation; tests and tools use
//! [`NoOpMetricsCollector`].
//!
//! # Examples
//!
//! ```rust
//! use repo_notifier_core::monitoring::{Ingress, MetricsCollector, NoOpMetricsCollector};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let metrics: Arc<dyn MetricsCollector> = Arc::new(NoOpMetricsCollector);
//!
//! metrics.record_message_received(Ingress::Push);
//! metrics.record_delivery(Duration::from_millis(120), true);
//! ```

use std::fmt;
use std::time::Duration;

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;

/// Path by which a payload entered the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ingress {
    Pull,
    Push,
}

impl Ingress {
    /// Label value used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Ingress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics collector for pipeline operations.
///
/// All methods take `&self` so a collector can be shared as
/// `Arc<dyn MetricsCollector>` across tasks. Recording never fails.
pub trait MetricsCollector: Send + Sync {
    /// Record a payload received from an ingress adapter.
    ///
    /// # Metrics Updated
    ///
    /// - `repo_notifier_messages_received_total{ingress}`: Incremented by 1
    fn record_message_received(&self, ingress: Ingress);

    /// Record a payload that could not be decoded.
    ///
    /// # Metrics Updated
    ///
    /// - `repo_notifier_malformed_payloads_total`: Incremented by 1
    fn record_malformed_payload(&self);

    /// Record a ref update that produced no notification.
    ///
    /// # Metrics Updated
    ///
    /// - `repo_notifier_notifications_skipped_total`: Incremented by 1
    fn record_notification_skipped(&self);

    /// Record a webhook delivery attempt.
    ///
    /// Notifications dropped by a disabled sink are not attempts and are not
    /// recorded here.
    ///
    /// # Parameters
    ///
    /// - `duration`: Time spent on the HTTP exchange
    /// - `success`: Whether the webhook answered with status 200
    ///
    /// # Metrics Updated
    ///
    /// - `repo_notifier_delivery_duration_seconds`: Histogram observation
    /// - `repo_notifier_notifications_delivered_total`: Incremented if success
    /// - `repo_notifier_delivery_failures_total`: Incremented if !success
    fn record_delivery(&self, duration: Duration, success: bool);
}

/// Collector that discards every measurement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn record_message_received(&self, _ingress: Ingress) {}

    fn record_malformed_payload(&self) {}

    fn record_notification_skipped(&self) {}

    fn record_delivery(&self, _duration: Duration, _success: bool) {}
}
