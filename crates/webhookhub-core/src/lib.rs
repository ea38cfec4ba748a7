//! Core domain models and persistence for the webhook relay.
//!
//! Provides strongly-typed identifiers, the delivery state machine, the
//! on-wire delivery job codec, and the repository layer over PostgreSQL.
//! The ingest API and the delivery worker both build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod job;
pub mod models;
pub mod storage;

pub use error::{CoreError, Result};
pub use job::DeliveryJob;
pub use models::{
    Delivery, DeliveryId, DeliveryStatus, Destination, DestinationId, DestinationRule, Event,
    EventId, RuleId, Source, SourceId,
};
pub use storage::Storage;

/// Maximum delivery attempts per destination, including the first.
///
/// Authoritative for worker decisions; the `max_attempts` column on each
/// delivery row is written from this constant for audit.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;
