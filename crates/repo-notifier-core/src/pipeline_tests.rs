//! Tests for the notification pipeline.

use super::*;
use crate::delivery::{DeliveryStatus, MockNotificationSink};
use crate::monitoring::{Ingress, NoOpMetricsCollector};
use crate::slack::SlackMessage;
use mockall::Sequence;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Collector counting each kind of measurement
#[derive(Default)]
struct CountingMetrics {
    malformed: AtomicUsize,
    skipped: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl MetricsCollector for CountingMetrics {
    fn record_message_received(&self, _ingress: Ingress) {}

    fn record_malformed_payload(&self) {
        self.malformed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_notification_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn record_delivery(&self, _duration: Duration, success: bool) {
        if success {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn status_error(status: u16) -> DeliveryError {
    DeliveryError::UnexpectedStatus {
        status,
        body: String::new(),
    }
}

const CREATE_PAYLOAD: &[u8] = br#"{
    "name": "projects/p1/repos/r1",
    "refUpdateEvent": {
        "email": "a@b.com",
        "refUpdates": {
            "x": {"refName": "refs/heads/main", "updateType": "CREATE", "newId": "abc123"}
        }
    }
}"#;

mod process_payload_tests {
    use super::*;

    /// Verify a single notifiable update produces one delivered message.
    #[tokio::test]
    async fn test_create_update_delivers_one_message() {
        // Arrange
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver()
            .withf(|message: &SlackMessage| {
                let attachment = &message.attachments[0];
                message.attachments.len() == 1
                    && attachment.title_link == "https://source.cloud.google.com/p1/r1/+/abc123"
                    && attachment.color == "#2e77ff"
                    && attachment.fields[1].title == "Branch"
                    && attachment.fields[1].value == "refs/heads/main"
            })
            .times(1)
            .returning(|_| Ok(DeliveryStatus::Sent));

        let metrics = Arc::new(CountingMetrics::default());
        let pipeline = NotificationPipeline::new(Arc::new(sink), metrics.clone());

        // Act
        let summary = pipeline.process_payload(CREATE_PAYLOAD).await.unwrap();

        // Assert
        assert_eq!(
            summary,
            ProcessingSummary {
                delivered: 1,
                skipped: 0,
                dropped: 0,
            }
        );
        assert_eq!(metrics.delivered.load(Ordering::SeqCst), 1);
    }

    /// Verify a disabled sink drops the notification without counting a delivery.
    #[tokio::test]
    async fn test_disabled_sink_records_no_delivery() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver()
            .times(1)
            .returning(|_| Ok(DeliveryStatus::Disabled));

        let metrics = Arc::new(CountingMetrics::default());
        let pipeline = NotificationPipeline::new(Arc::new(sink), metrics.clone());

        let summary = pipeline.process_payload(CREATE_PAYLOAD).await.unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.dropped, 1);
        assert_eq!(metrics.delivered.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.failed.load(Ordering::SeqCst), 0);
    }

    /// Verify an unknown classification is skipped without any delivery.
    #[tokio::test]
    async fn test_unknown_update_type_skips_delivery() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver().times(0);

        let metrics = Arc::new(CountingMetrics::default());
        let pipeline = NotificationPipeline::new(Arc::new(sink), metrics.clone());

        let payload = br#"{
            "name": "projects/p1/repos/r1",
            "refUpdateEvent": {"refUpdates": {"x": {"updateType": "UNKNOWN", "newId": "abc"}}}
        }"#;
        let summary = pipeline.process_payload(payload).await.unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(metrics.skipped.load(Ordering::SeqCst), 1);
    }

    /// Verify an invalid resource name is skipped without any delivery.
    #[tokio::test]
    async fn test_invalid_resource_name_skips_delivery() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver().times(0);

        let pipeline = NotificationPipeline::new(Arc::new(sink), Arc::new(NoOpMetricsCollector));

        let payload = br#"{
            "name": "projects/p/repos/a/b",
            "refUpdateEvent": {"refUpdates": {"x": {"updateType": "CREATE"}}}
        }"#;
        let summary = pipeline.process_payload(payload).await.unwrap();

        assert_eq!(summary.skipped, 1);
    }

    /// Verify a payload without ref updates succeeds with nothing to do.
    #[tokio::test]
    async fn test_empty_envelope_succeeds() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver().times(0);

        let pipeline = NotificationPipeline::new(Arc::new(sink), Arc::new(NoOpMetricsCollector));
        let summary = pipeline.process_payload(b"{}").await.unwrap();

        assert_eq!(summary, ProcessingSummary::default());
    }

    /// Verify malformed payloads are reported as decode errors and counted.
    #[tokio::test]
    async fn test_malformed_payload() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver().times(0);

        let metrics = Arc::new(CountingMetrics::default());
        let pipeline = NotificationPipeline::new(Arc::new(sink), metrics.clone());

        let error = pipeline.process_payload(b"{not json").await.unwrap_err();

        assert!(matches!(error, PipelineError::Decode(_)));
        assert!(!error.is_retryable());
        assert_eq!(metrics.malformed.load(Ordering::SeqCst), 1);
    }
}

mod fail_fast_tests {
    use super::*;

    const TWO_UPDATES: &[u8] = br#"{
        "name": "projects/p1/repos/r1",
        "refUpdateEvent": {
            "email": "a@b.com",
            "refUpdates": {
                "refs/heads/a": {"refName": "refs/heads/a", "updateType": "CREATE", "newId": "111"},
                "refs/heads/b": {"refName": "refs/heads/b", "updateType": "DELETE", "newId": "222"},
                "refs/heads/c": {"refName": "refs/heads/c", "updateType": "CREATE", "newId": "333"}
            }
        }
    }"#;

    /// Verify the first failure stops processing after earlier deliveries were made.
    #[tokio::test]
    async fn test_second_failure_stops_processing() {
        // Arrange
        let mut seq = Sequence::new();
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver()
            .withf(|m: &SlackMessage| m.attachments[0].fields[1].value == "refs/heads/a")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(DeliveryStatus::Sent));
        sink.expect_deliver()
            .withf(|m: &SlackMessage| m.attachments[0].fields[1].value == "refs/heads/b")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(status_error(500)));

        let metrics = Arc::new(CountingMetrics::default());
        let pipeline = NotificationPipeline::new(Arc::new(sink), metrics.clone());

        // Act
        let error = pipeline.process_payload(TWO_UPDATES).await.unwrap_err();

        // Assert
        match &error {
            PipelineError::Delivery { ref_key, source } => {
                assert_eq!(ref_key, "refs/heads/b");
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("expected delivery failure, got {:?}", other),
        }
        assert!(error.is_retryable());
        assert_eq!(metrics.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.failed.load(Ordering::SeqCst), 1);
    }
}
