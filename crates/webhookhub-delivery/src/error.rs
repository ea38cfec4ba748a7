//! Error types for delivery worker operations.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while running the delivery worker.
///
/// HTTP failures are not errors here: they are classified outcomes carried
/// by [`crate::DeliveryOutcome`]. This type covers the infrastructure
/// around dispatch, where failure means the message must be dead-lettered
/// rather than acked.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Durable status write failed.
    #[error("database error: {0}")]
    Database(String),

    /// Broker consume or publish failed.
    #[error("broker error: {0}")]
    Broker(#[from] webhookhub_broker::BrokerError),

    /// HTTP client could not be constructed.
    #[error("client configuration error: {0}")]
    Configuration(String),
}

impl From<webhookhub_core::CoreError> for DeliveryError {
    fn from(err: webhookhub_core::CoreError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<lapin::Error> for DeliveryError {
    fn from(err: lapin::Error) -> Self {
        Self::Broker(webhookhub_broker::BrokerError::Protocol(err))
    }
}
