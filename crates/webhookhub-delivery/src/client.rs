//! HTTP delivery client with layered timeouts and response classification.
//!
//! One POST per delivery attempt. Three independent timeout axes guard
//! against distinct failure modes: connect (unreachable host), read
//! (stalled stream), and total request (wall-clock budget). Every outcome
//! is classified as success, retryable failure, or terminal failure; the
//! classifier is a pure function so the retry policy can be tested without
//! a network.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, redirect};
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// Configuration for the delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP/TLS handshake budget.
    pub connect_timeout: Duration,
    /// Maximum gap between bytes on the response stream.
    pub read_timeout: Duration,
    /// Total wall-clock budget for the round trip.
    pub request_timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: "WebhookHub-Delivery/1.0".to_string(),
        }
    }
}

/// Outcome of one delivery attempt.
///
/// Matched exhaustively at the call site; there is no third shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Any 2xx response.
    Success {
        /// HTTP status code received.
        status: u16,
    },

    /// Anything else, classified for the retry decision.
    Failure {
        /// Human-readable description, persisted as `last_error`.
        message: String,
        /// HTTP status if a response was received; `None` for transport
        /// failures.
        status_code: Option<u16>,
        /// Whether the failure is eligible for automatic re-attempt.
        retryable: bool,
    },
}

impl DeliveryOutcome {
    /// True for the `Success` variant.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Classifies an HTTP status code into a delivery outcome.
///
/// 2xx is success; 429 and 5xx are retryable; every other status
/// (including 3xx, which the client never follows) is terminal.
pub fn classify_response(status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Success { status },
        429 => DeliveryOutcome::Failure {
            message: format!("HTTP {status}"),
            status_code: Some(status),
            retryable: true,
        },
        500..=599 => DeliveryOutcome::Failure {
            message: format!("HTTP {status}"),
            status_code: Some(status),
            retryable: true,
        },
        _ => DeliveryOutcome::Failure {
            message: format!("HTTP {status}"),
            status_code: Some(status),
            retryable: false,
        },
    }
}

/// HTTP client for webhook delivery.
///
/// Connection pooling lives inside `reqwest`; this wrapper fixes the
/// timeout set, disables redirect following so 3xx responses reach the
/// classifier, and pins the outbound content type.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the underlying client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| {
                DeliveryError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Creates a client with the standard timeout set.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` on builder failure.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs the stored payload to a destination and classifies the result.
    ///
    /// The body is passed through byte-for-byte; the content type is fixed
    /// to `application/json`. Transport-level failures (DNS, TLS, connect,
    /// timeout) classify as retryable with no status code.
    pub async fn post(&self, url: &str, payload_json: &str) -> DeliveryOutcome {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload_json.to_owned())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url, status, "destination responded");
                classify_response(status)
            },
            Err(e) => {
                debug!(url, error = %e, "delivery request failed");
                DeliveryOutcome::Failure {
                    message: e.to_string(),
                    status_code: None,
                    retryable: true,
                }
            },
        }
    }

    /// Releases pooled connections.
    ///
    /// Idle connections close when the last clone of the inner client is
    /// dropped; this consumes the handle to make teardown explicit during
    /// shutdown.
    pub fn shutdown(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_xx_is_success() {
        assert_eq!(classify_response(200), DeliveryOutcome::Success { status: 200 });
        assert_eq!(classify_response(204), DeliveryOutcome::Success { status: 204 });
        assert_eq!(classify_response(299), DeliveryOutcome::Success { status: 299 });
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        for status in [429, 500, 503, 599] {
            match classify_response(status) {
                DeliveryOutcome::Failure { retryable, status_code, .. } => {
                    assert!(retryable, "HTTP {status} should be retryable");
                    assert_eq!(status_code, Some(status));
                },
                DeliveryOutcome::Success { .. } => unreachable!("HTTP {status} is not a success"),
            }
        }
    }

    #[test]
    fn other_statuses_are_terminal() {
        for status in [301, 302, 400, 404, 410, 428, 430] {
            match classify_response(status) {
                DeliveryOutcome::Failure { retryable, message, .. } => {
                    assert!(!retryable, "HTTP {status} should be terminal");
                    assert_eq!(message, format!("HTTP {status}"));
                },
                DeliveryOutcome::Success { .. } => unreachable!("HTTP {status} is not a success"),
            }
        }
    }
}
