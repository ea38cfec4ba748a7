//! Request handlers for ingest, admin, and health endpoints.

pub mod admin;
pub mod health;
pub mod ingest;

pub use admin::{add_destination_rule, create_destination, create_source, list_event_deliveries};
pub use health::health_check;
pub use ingest::ingest_event;
