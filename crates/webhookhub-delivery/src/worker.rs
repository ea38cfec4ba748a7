//! Delivery worker: consumes jobs, dispatches, persists, acknowledges.
//!
//! Per-message contract, in order:
//!
//! 1. Decode the job; poison messages are nacked without requeue and land
//!    in the dead-letter queue.
//! 2. Dispatch over HTTP and classify the outcome.
//! 3. Persist the resulting delivery state. This write strictly precedes
//!    the acknowledgement; acking first would lose the outcome on a crash
//!    between the two.
//! 4. For retryable failures below the attempt ceiling, schedule the next
//!    attempt on the broker, then ack. Terminal outcomes just ack.
//! 5. Any infrastructure error after decode nacks without requeue, routing
//!    the message to the dead-letter queue for manual inspection.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use lapin::{
    message::Delivery as AmqpMessage,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};
use webhookhub_broker::{topology::QUEUE_DELIVERIES, JobPublisher};
use webhookhub_core::{DeliveryJob, DeliveryStatus, Storage, MAX_DELIVERY_ATTEMPTS};

use crate::{
    backoff::retry_delay,
    client::{DeliveryClient, DeliveryOutcome},
    error::Result,
    DEFAULT_PREFETCH,
};

/// Configuration for the delivery worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unacked-message bound per consumer.
    pub prefetch: u16,
    /// Consumer tag reported to the broker.
    pub consumer_tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { prefetch: DEFAULT_PREFETCH, consumer_tag: "webhookhub-worker".to_string() }
    }
}

/// What the worker does with a classified outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Persist `DELIVERED` and ack.
    Delivered,

    /// Persist `RETRYING`, schedule the next attempt, ack.
    Retry {
        /// Broker-side delay before the next attempt.
        delay: std::time::Duration,
    },

    /// Persist `DEAD` and ack. The status row is the terminal record; the
    /// dead-letter queue is not used on this path.
    Dead,
}

/// Maps an outcome and attempt number onto the state machine.
///
/// A failure goes dead when it is non-retryable or when this attempt was
/// the last one allowed; otherwise the delay comes from the backoff table
/// keyed by the attempt that just failed.
pub fn decide(outcome: &DeliveryOutcome, attempt: u32) -> Disposition {
    match outcome {
        DeliveryOutcome::Success { .. } => Disposition::Delivered,
        DeliveryOutcome::Failure { retryable, .. } => {
            let exceeded = attempt >= MAX_DELIVERY_ATTEMPTS;
            if exceeded || !retryable {
                Disposition::Dead
            } else {
                Disposition::Retry { delay: retry_delay(attempt) }
            }
        },
    }
}

/// Broker-driven delivery worker.
pub struct DeliveryWorker {
    channel: Channel,
    storage: Storage,
    client: Arc<DeliveryClient>,
    publisher: JobPublisher,
    config: WorkerConfig,
}

impl DeliveryWorker {
    /// Creates a worker consuming on the given channel.
    pub fn new(
        channel: Channel,
        storage: Storage,
        client: Arc<DeliveryClient>,
        publisher: JobPublisher,
        config: WorkerConfig,
    ) -> Self {
        Self { channel, storage, client, publisher, config }
    }

    /// Consumes delivery jobs until cancelled, then drains in-flight work.
    ///
    /// Each message is handled on its own task; the prefetch bound caps
    /// how many run at once. Unacked messages held at teardown are
    /// returned to the queue by the server when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns error if the consumer cannot be established.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.channel.basic_qos(self.config.prefetch, BasicQosOptions::default()).await?;

        let mut consumer = self
            .channel
            .basic_consume(
                QUEUE_DELIVERIES,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = QUEUE_DELIVERIES,
            prefetch = self.config.prefetch,
            "delivery worker consuming"
        );

        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("delivery worker received shutdown signal");
                    break;
                }
                message = consumer.next() => match message {
                    Some(Ok(message)) => {
                        let storage = self.storage.clone();
                        let client = self.client.clone();
                        let publisher = self.publisher.clone();
                        tracker.spawn(async move {
                            handle_message(&storage, &client, &publisher, message).await;
                        });
                    },
                    Some(Err(e)) => {
                        error!(error = %e, "consumer stream error");
                        break;
                    },
                    None => {
                        warn!("consumer stream closed by broker");
                        break;
                    },
                },
            }
        }

        tracker.close();
        tracker.wait().await;
        info!("delivery worker drained");
        Ok(())
    }
}

/// Processes one broker message through dispatch, persist, and settle.
async fn handle_message(
    storage: &Storage,
    client: &DeliveryClient,
    publisher: &JobPublisher,
    message: AmqpMessage,
) {
    let job = match DeliveryJob::decode(&message.data) {
        Ok(job) => job,
        Err(e) => {
            warn!(error = %e, "undecodable delivery job, dead-lettering");
            nack_no_requeue(&message).await;
            return;
        },
    };

    debug!(
        delivery_id = %job.delivery_id,
        event_id = %job.event_id,
        attempt = job.attempt,
        url = %job.target_url,
        "dispatching delivery"
    );

    let outcome = client.post(&job.target_url, &job.payload_json).await;

    match settle(storage, publisher, &job, &outcome).await {
        Ok(()) => {
            if let Err(e) = message.acker.ack(BasicAckOptions::default()).await {
                error!(delivery_id = %job.delivery_id, error = %e, "ack failed");
            }
        },
        Err(e) => {
            // State is unknown or partially written; hand the message to
            // the dead-letter queue for manual inspection rather than ack.
            error!(delivery_id = %job.delivery_id, error = %e, "settling delivery failed");
            nack_no_requeue(&message).await;
        },
    }
}

/// Persists the outcome and schedules any follow-up, before the ack.
async fn settle(
    storage: &Storage,
    publisher: &JobPublisher,
    job: &DeliveryJob,
    outcome: &DeliveryOutcome,
) -> Result<()> {
    // Timestamp precedence: captured after the HTTP exchange finished.
    let completed_at = Utc::now();
    let attempts = i32::try_from(job.attempt).unwrap_or(i32::MAX);

    match decide(outcome, job.attempt) {
        Disposition::Delivered => {
            storage.deliveries.mark_delivered(job.delivery_id, attempts, completed_at).await?;
            info!(
                delivery_id = %job.delivery_id,
                attempt = job.attempt,
                "delivered"
            );
        },
        Disposition::Retry { delay } => {
            let message = failure_message(outcome);
            storage
                .deliveries
                .mark_failed(
                    job.delivery_id,
                    DeliveryStatus::Retrying,
                    attempts,
                    message,
                    completed_at,
                )
                .await?;
            publisher.publish_retry(&job.next_attempt(), delay).await?;
            warn!(
                delivery_id = %job.delivery_id,
                attempt = job.attempt,
                delay_ms = delay.as_millis() as u64,
                error = message,
                "delivery failed, retry scheduled"
            );
        },
        Disposition::Dead => {
            let message = failure_message(outcome);
            storage
                .deliveries
                .mark_failed(job.delivery_id, DeliveryStatus::Dead, attempts, message, completed_at)
                .await?;
            error!(
                delivery_id = %job.delivery_id,
                attempt = job.attempt,
                error = message,
                "delivery dead"
            );
        },
    }

    Ok(())
}

fn failure_message(outcome: &DeliveryOutcome) -> &str {
    match outcome {
        DeliveryOutcome::Success { .. } => "",
        DeliveryOutcome::Failure { message, .. } => message,
    }
}

async fn nack_no_requeue(message: &AmqpMessage) {
    let options = BasicNackOptions { requeue: false, ..Default::default() };
    if let Err(e) = message.acker.nack(options).await {
        error!(error = %e, "nack failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn retryable_failure() -> DeliveryOutcome {
        DeliveryOutcome::Failure {
            message: "HTTP 500".to_string(),
            status_code: Some(500),
            retryable: true,
        }
    }

    fn terminal_failure() -> DeliveryOutcome {
        DeliveryOutcome::Failure {
            message: "HTTP 400".to_string(),
            status_code: Some(400),
            retryable: false,
        }
    }

    #[test]
    fn success_is_delivered_regardless_of_attempt() {
        let outcome = DeliveryOutcome::Success { status: 200 };
        assert_eq!(decide(&outcome, 1), Disposition::Delivered);
        assert_eq!(decide(&outcome, MAX_DELIVERY_ATTEMPTS), Disposition::Delivered);
    }

    #[test]
    fn retryable_failure_below_ceiling_retries_with_backoff() {
        assert_eq!(
            decide(&retryable_failure(), 1),
            Disposition::Retry { delay: Duration::from_secs(30) }
        );
        assert_eq!(
            decide(&retryable_failure(), 2),
            Disposition::Retry { delay: Duration::from_secs(120) }
        );
        assert_eq!(
            decide(&retryable_failure(), 3),
            Disposition::Retry { delay: Duration::from_secs(600) }
        );
        assert_eq!(
            decide(&retryable_failure(), 4),
            Disposition::Retry { delay: Duration::from_secs(1800) }
        );
    }

    #[test]
    fn fifth_failed_attempt_goes_dead() {
        assert_eq!(decide(&retryable_failure(), 5), Disposition::Dead);
        assert_eq!(decide(&retryable_failure(), 6), Disposition::Dead);
    }

    #[test]
    fn non_retryable_failure_goes_dead_on_first_attempt() {
        assert_eq!(decide(&terminal_failure(), 1), Disposition::Dead);
    }

    #[test]
    fn network_failure_without_status_retries() {
        let outcome = DeliveryOutcome::Failure {
            message: "connection refused".to_string(),
            status_code: None,
            retryable: true,
        };
        assert_eq!(decide(&outcome, 1), Disposition::Retry { delay: Duration::from_secs(30) });
    }
}
