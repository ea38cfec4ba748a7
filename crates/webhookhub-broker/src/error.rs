//! Error types for broker operations.

use thiserror::Error;

/// Result type alias using `BrokerError`.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised by broker connection, topology, and publish operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// AMQP protocol or connection failure.
    #[error("broker protocol error: {0}")]
    Protocol(#[from] lapin::Error),

    /// Job could not be encoded for the wire.
    #[error("job encode error: {0}")]
    Codec(#[from] webhookhub_core::CoreError),
}
