//! Pull-subscription ingress.
//!
//! The subscriber pulls batches from a subscription, runs every message of a
//! batch concurrently through a [`MessageHandler`], and acknowledges or rejects
//! each message according to the handler's decision. A handler that panics
//! still gets its message acknowledged so that one poison message cannot loop
//! forever.
//!
//! Cancellation stops the receive loop only. A batch that is already being
//! processed runs to completion.

use crate::handler::{AckDecision, MessageHandler};
use crate::monitoring::{Ingress, MetricsCollector};
use queue_runtime::{QueueClient, QueueError, ReceivedMessage, SubscriptionName};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

#[cfg(test)]
#[path = "subscriber_tests.rs"]
mod tests;

/// Default number of messages requested per pull
pub const DEFAULT_MAX_MESSAGES: u32 = 10;

/// Pause after a failed pull before trying again
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Long-poll duration of a single pull
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Consumer loop for a pull subscription
pub struct PullSubscriber {
    client: Arc<dyn QueueClient>,
    subscription: SubscriptionName,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<dyn MetricsCollector>,
    max_messages: u32,
    receive_timeout: Duration,
    error_backoff: Duration,
}

impl PullSubscriber {
    pub fn new(
        client: Arc<dyn QueueClient>,
        subscription: SubscriptionName,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            client,
            subscription,
            handler,
            metrics,
            max_messages: DEFAULT_MAX_MESSAGES,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Set the number of messages requested per pull
    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Set the long-poll duration of a single pull
    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    /// Set the pause after a failed pull
    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Subscription being consumed
    pub fn subscription(&self) -> &SubscriptionName {
        &self.subscription
    }

    /// Verify that the subscription is reachable
    pub async fn verify(&self) -> Result<(), QueueError> {
        self.client.check_subscription(&self.subscription).await
    }

    /// Consume the subscription until the token is cancelled
    pub async fn run(&self, ctx: CancellationToken) {
        info!(
            subscription = %self.subscription,
            provider = %self.client.provider_type(),
            max_messages = self.max_messages,
            "Starting pull subscriber"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping pull subscriber");
                    break;
                }
                result = self.receive_batch() => {
                    match result {
                        Ok(batch) => self.process_batch(batch).await,
                        Err(e) => {
                            error!(
                                error = %e,
                                transient = e.is_transient(),
                                "Failed to receive messages"
                            );
                            tokio::select! {
                                _ = ctx.cancelled() => {}
                                _ = tokio::time::sleep(self.error_backoff) => {}
                            }
                        }
                    }
                }
            }
        }

        info!("Pull subscriber stopped gracefully");
    }

    async fn receive_batch(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        let timeout = chrono::Duration::from_std(self.receive_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        self.client
            .receive_messages(&self.subscription, self.max_messages, timeout)
            .await
    }

    /// Handle every message of a batch concurrently and wait for all of them
    async fn process_batch(&self, batch: Vec<ReceivedMessage>) {
        if batch.is_empty() {
            return;
        }

        debug!(message_count = batch.len(), "Received message batch");

        let mut tasks = JoinSet::new();
        for message in batch {
            let span = tracing::info_span!(
                "pull_message",
                message_id = %message.message_id,
                delivery_count = message.delivery_count
            );
            tasks.spawn(
                process_message(
                    self.client.clone(),
                    self.handler.clone(),
                    self.metrics.clone(),
                    message,
                )
                .instrument(span),
            );
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Message task failed");
            }
        }
    }
}

/// Run the handler for one message and settle it with the queue
async fn process_message(
    client: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<dyn MetricsCollector>,
    message: ReceivedMessage,
) {
    metrics.record_message_received(Ingress::Pull);
    debug!("Received message");

    let body = message.body.clone();
    let decision = match tokio::spawn(async move { handler.handle(&body).await }).await {
        Ok(decision) => decision,
        Err(e) if e.is_panic() => {
            error!("Message handler panicked, acknowledging message");
            AckDecision::Ack
        }
        Err(e) => {
            warn!(error = %e, "Message handler was cancelled, requesting redelivery");
            AckDecision::Nack
        }
    };

    let receipt = message.receipt_handle;
    if receipt.is_expired() {
        warn!(
            decision = ?decision,
            "Ack deadline passed before the message was settled, it may be redelivered"
        );
    }
    let result = match decision {
        AckDecision::Ack => client.complete_message(receipt).await,
        AckDecision::Nack => client.abandon_message(receipt).await,
    };

    if let Err(e) = result {
        error!(error = %e, decision = ?decision, "Failed to settle message");
    }
}
