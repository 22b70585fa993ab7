//! Service composition: builds the pipeline and runs the selected ingress.

use queue_runtime::{QueueClient, QueueClientFactory, QueueError};
use repo_notifier_api::{
    shutdown_signal, start_server, ConfigError, ServiceConfig, ServiceError, ServiceMetrics,
    ServiceMode,
};
use repo_notifier_core::{
    MessageHandler, MetricsCollector, NotificationPipeline, PipelineHandler, PullSubscriber,
    SlackWebhookClient,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;

/// Errors that stop the service
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue connection failed: {0}")]
    Queue(#[from] QueueError),
}

impl StartupError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Service(e) => e.exit_code(),
            Self::Configuration(_) => 3,
            Self::Queue(_) => 4,
        }
    }
}

/// Build the handler running payloads through the notification pipeline
pub fn build_handler(
    config: &ServiceConfig,
    metrics: Arc<dyn MetricsCollector>,
) -> Arc<dyn MessageHandler> {
    let sink = SlackWebhookClient::new(
        config.slack.webhook_url.expose_secret(),
        config.slack.timeout(),
    );
    if !sink.is_enabled() {
        warn!("No Slack webhook URL configured, notifications are disabled");
    }

    let pipeline = NotificationPipeline::new(Arc::new(sink), metrics);
    Arc::new(PipelineHandler::new(Arc::new(pipeline)))
}

/// Run the service until shutdown
pub async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    config.validate()?;

    let metrics = ServiceMetrics::new().map_err(|e| ConfigError::Invalid {
        message: format!("Failed to initialize metrics: {}", e),
    })?;
    let handler = build_handler(&config, metrics.clone());

    info!(mode = %config.mode, "Starting repo-notifier");

    match config.mode {
        ServiceMode::Push => {
            start_server(config, handler, metrics).await?;
        }
        ServiceMode::Pull => {
            let client: Arc<dyn QueueClient> =
                Arc::from(QueueClientFactory::create_client(config.queue_config()).await?);

            let ctx = CancellationToken::new();
            tokio::spawn({
                let ctx = ctx.clone();
                async move {
                    shutdown_signal().await;
                    ctx.cancel();
                }
            });

            run_pull(&config, client, handler, metrics, ctx).await?;
        }
    }

    info!("repo-notifier stopped");
    Ok(())
}

/// Verify the subscription and consume it until the token is cancelled
pub async fn run_pull(
    config: &ServiceConfig,
    client: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<dyn MetricsCollector>,
    ctx: CancellationToken,
) -> Result<(), StartupError> {
    let subscription = config.pubsub.subscription_name()?;
    let subscriber = PullSubscriber::new(client, subscription, handler, metrics)
        .with_max_messages(config.pubsub.max_messages);

    subscriber.verify().await?;
    info!(
        project_id = %config.pubsub.project_id,
        subscription = %subscriber.subscription(),
        "Subscription verified"
    );

    subscriber.run(ctx).await;
    Ok(())
}
