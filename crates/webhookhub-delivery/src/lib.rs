//! Webhook delivery: HTTP dispatch and the broker-driven worker.
//!
//! The worker consumes delivery jobs from the main queue with bounded
//! prefetch, dispatches them over HTTP, persists the resulting state, and
//! only then acknowledges. Retry timing is delegated entirely to the
//! broker via the holding-queue TTL mechanism; the worker holds no state
//! about pending retries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod error;
pub mod worker;

pub use backoff::retry_delay;
pub use client::{ClientConfig, DeliveryClient, DeliveryOutcome};
pub use error::{DeliveryError, Result};
pub use worker::{decide, DeliveryWorker, Disposition, WorkerConfig};

/// Bound on unacknowledged messages per consumer.
///
/// Matches the worker's database pool size so every in-flight message can
/// acquire a connection.
pub const DEFAULT_PREFETCH: u16 = 5;
