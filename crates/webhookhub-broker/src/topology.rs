//! Exchange, queue, and binding declarations.
//!
//! Five resources bind into the retry loop:
//!
//! ```text
//!                      ("delivery")
//!   webhookhub ──────────────────────► webhookhub.deliveries ──► consumer
//!       ▲                                  │ TTL 30 min / nack
//!       │ DLX + DLRK on expiry             ▼
//!   deliveries.retry.q ◄── worker      deliveries.dlx ──► deliveries.dlq
//!   (no consumers; per-message TTL)
//! ```
//!
//! Expiry out of the retry queue is the backoff mechanism and routes back
//! to the main queue. Dead-lettering out of the main queue (nack without
//! requeue, or the 30-minute safety TTL) is terminal and lands in the DLQ
//! for manual replay. The two paths must not be confused.

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, ShortString},
    Channel, ExchangeKind,
};
use tracing::debug;

use crate::error::Result;

/// Main direct exchange; ingest publishes delivery jobs here.
pub const EXCHANGE_MAIN: &str = "webhookhub";

/// Fanout dead-letter exchange for poison and expired main-queue messages.
pub const EXCHANGE_DLX: &str = "deliveries.dlx";

/// Main work queue consumed by delivery workers.
pub const QUEUE_DELIVERIES: &str = "webhookhub.deliveries";

/// Consumer-less holding queue; per-message TTL implements backoff.
pub const QUEUE_RETRY: &str = "deliveries.retry.q";

/// Terminal dead-letter queue; manual replay only.
pub const QUEUE_DLQ: &str = "deliveries.dlq";

/// Routing key binding the main exchange to the main queue.
pub const ROUTING_KEY_DELIVERY: &str = "delivery";

/// Safety net: a message must be decided within this window or it is
/// treated as poison and dead-lettered.
pub const MAIN_QUEUE_TTL_MS: i32 = 1_800_000;

/// Declares all exchanges, queues, and bindings.
///
/// Runs on every startup of both the ingest and worker processes.
/// Re-declaration with identical arguments is a no-op; divergent arguments
/// fail the channel and must abort startup.
///
/// # Errors
///
/// Returns `BrokerError::Protocol` on any declaration failure.
pub async fn declare(channel: &Channel) -> Result<()> {
    let durable = ExchangeDeclareOptions { durable: true, ..Default::default() };

    channel
        .exchange_declare(EXCHANGE_MAIN, ExchangeKind::Direct, durable, FieldTable::default())
        .await?;

    channel
        .exchange_declare(EXCHANGE_DLX, ExchangeKind::Fanout, durable, FieldTable::default())
        .await?;

    let queue_opts = QueueDeclareOptions { durable: true, ..Default::default() };

    let mut main_args = FieldTable::default();
    main_args.insert(ShortString::from("x-message-ttl"), AMQPValue::LongInt(MAIN_QUEUE_TTL_MS));
    main_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(EXCHANGE_DLX.into()),
    );
    channel.queue_declare(QUEUE_DELIVERIES, queue_opts, main_args).await?;

    // Expired messages dead-letter straight back into the main exchange
    // with the delivery routing key; that round trip is the retry timer.
    let mut retry_args = FieldTable::default();
    retry_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(EXCHANGE_MAIN.into()),
    );
    retry_args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(ROUTING_KEY_DELIVERY.into()),
    );
    channel.queue_declare(QUEUE_RETRY, queue_opts, retry_args).await?;

    channel.queue_declare(QUEUE_DLQ, queue_opts, FieldTable::default()).await?;

    channel
        .queue_bind(
            QUEUE_DELIVERIES,
            EXCHANGE_MAIN,
            ROUTING_KEY_DELIVERY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    // The retry queue has no explicit binding: workers publish to it via
    // the default exchange with the queue name as the routing key.
    channel
        .queue_bind(
            QUEUE_DLQ,
            EXCHANGE_DLX,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    debug!("broker topology declared");
    Ok(())
}
