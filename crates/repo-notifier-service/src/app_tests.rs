//! Tests for service composition.

use super::*;
use queue_runtime::{InMemoryProvider, QueueConfig, StandardQueueClient};
use repo_notifier_core::{AckDecision, NoOpMetricsCollector};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pull_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.pubsub.project_id = "p1".to_string();
    config.pubsub.subscription = "repo-events".to_string();
    config
}

mod exit_code_tests {
    use super::*;

    /// Verify each startup failure maps to its exit code.
    #[test]
    fn test_exit_codes() {
        let bind = StartupError::from(ServiceError::BindFailed {
            address: "0.0.0.0:8080".to_string(),
            message: "in use".to_string(),
        });
        let server = StartupError::from(ServiceError::ServerFailed {
            message: "boom".to_string(),
        });
        let config = StartupError::from(ConfigError::Missing {
            key: "pubsub.project_id".to_string(),
        });
        let queue = StartupError::from(QueueError::ConnectionFailed {
            message: "refused".to_string(),
        });

        assert_eq!(bind.exit_code(), 1);
        assert_eq!(server.exit_code(), 2);
        assert_eq!(config.exit_code(), 3);
        assert_eq!(queue.exit_code(), 4);
    }

    /// Verify an invalid configuration stops startup before any connection.
    #[tokio::test]
    async fn test_run_rejects_invalid_configuration() {
        let result = run(ServiceConfig::default()).await;

        match result {
            Err(e @ StartupError::Configuration(_)) => assert_eq!(e.exit_code(), 3),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}

mod handler_tests {
    use super::*;

    /// Verify a handler without webhook URL acknowledges without delivering.
    #[tokio::test]
    async fn test_handler_without_webhook_acks() {
        let handler = build_handler(&pull_config(), Arc::new(NoOpMetricsCollector));

        let decision = handler
            .handle(br#"{"name":"projects/p1/repos/r1","refUpdateEvent":{"refUpdates":{"x":{"refName":"refs/heads/main","updateType":"CREATE","newId":"abc"}}}}"#)
            .await;

        assert_eq!(decision, AckDecision::Ack);
    }
}

mod pull_tests {
    use super::*;

    /// Verify a cancelled run returns cleanly after the subscription check.
    #[tokio::test]
    async fn test_run_pull_stops_when_cancelled() {
        let config = pull_config();
        let client = Arc::new(StandardQueueClient::new(
            Box::new(InMemoryProvider::default()),
            QueueConfig::default(),
        ));
        let handler = build_handler(&config, Arc::new(NoOpMetricsCollector));

        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_pull(&config, client, handler, Arc::new(NoOpMetricsCollector), ctx),
        )
        .await
        .expect("run_pull should return");

        assert!(result.is_ok());
    }

    /// Verify a missing subscription is a queue connection failure.
    #[tokio::test]
    async fn test_run_pull_reports_missing_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p1/subscriptions/repo-events"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "Resource not found", "status": "NOT_FOUND"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = pull_config();
        config.pubsub.use_emulator(&server.uri());

        let client: Arc<dyn QueueClient> = Arc::from(
            QueueClientFactory::create_client(config.queue_config())
                .await
                .unwrap(),
        );
        let handler = build_handler(&config, Arc::new(NoOpMetricsCollector));

        let result = run_pull(
            &config,
            client,
            handler,
            Arc::new(NoOpMetricsCollector),
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(e @ StartupError::Queue(QueueError::SubscriptionNotFound { .. })) => {
                assert_eq!(e.exit_code(), 4)
            }
            other => panic!("expected SubscriptionNotFound, got {:?}", other),
        }
    }

    /// Verify an invalid subscription name is a configuration failure.
    #[tokio::test]
    async fn test_run_pull_rejects_invalid_subscription() {
        let mut config = pull_config();
        config.pubsub.subscription = "x".to_string();

        let result = run_pull(
            &config,
            Arc::from(QueueClientFactory::create_test_client()),
            build_handler(&config, Arc::new(NoOpMetricsCollector)),
            Arc::new(NoOpMetricsCollector),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(StartupError::Configuration(_))));
    }
}
