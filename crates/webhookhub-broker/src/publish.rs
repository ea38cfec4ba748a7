//! Delivery job publishers.
//!
//! Two publish paths exist: first attempts go through the main exchange,
//! retries go to the holding queue with a per-message expiration equal to
//! the backoff delay. Both are marked persistent.

use std::time::Duration;

use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties, Channel};
use tracing::debug;
use webhookhub_core::DeliveryJob;

use crate::{
    error::Result,
    topology::{EXCHANGE_MAIN, QUEUE_RETRY, ROUTING_KEY_DELIVERY},
};

/// Persistent delivery mode per AMQP 0.9.1.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Publisher for delivery jobs.
///
/// Cheap to clone; wraps the process channel.
#[derive(Clone)]
pub struct JobPublisher {
    channel: Channel,
}

impl JobPublisher {
    /// Creates a publisher over the given channel.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Publishes a first-attempt job to the main exchange.
    ///
    /// Ingest calls this only after its database transaction has
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the publish fails.
    pub async fn publish_job(&self, job: &DeliveryJob) -> Result<()> {
        let payload = job.encode()?;
        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type(ShortString::from("application/json"));

        self.channel
            .basic_publish(
                EXCHANGE_MAIN,
                ROUTING_KEY_DELIVERY,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        debug!(delivery_id = %job.delivery_id, attempt = job.attempt, "published delivery job");
        Ok(())
    }

    /// Schedules a retry by publishing to the consumer-less holding queue.
    ///
    /// The per-message expiration is the backoff delay; on expiry the
    /// broker dead-letters the message back into the main queue. Published
    /// via the default exchange, so the routing key is the queue name.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the publish fails.
    pub async fn publish_retry(&self, job: &DeliveryJob, delay: Duration) -> Result<()> {
        let payload = job.encode()?;
        let expiration = delay.as_millis().to_string();
        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type(ShortString::from("application/json"))
            .with_expiration(ShortString::from(expiration.as_str()));

        self.channel
            .basic_publish(
                "",
                QUEUE_RETRY,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        debug!(
            delivery_id = %job.delivery_id,
            attempt = job.attempt,
            expiration_ms = %expiration,
            "scheduled retry"
        );
        Ok(())
    }
}
