//! HTTP API: webhook ingest, admin CRUD, and health.
//!
//! The ingest endpoint authenticates sources, captures events exactly once
//! under the idempotency constraint, fans out deliveries inside the same
//! transaction, and publishes delivery jobs only after commit. Admin
//! endpoints register sources and destinations; health backs readiness
//! probes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod server;

use webhookhub_broker::JobPublisher;
use webhookhub_core::Storage;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository layer.
    pub storage: Storage,
    /// Publisher for delivery jobs, used only after commit.
    pub publisher: JobPublisher,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(storage: Storage, publisher: JobPublisher) -> Self {
        Self { storage, publisher }
    }
}
