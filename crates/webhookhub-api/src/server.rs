//! HTTP server setup and routing.
//!
//! Requests flow through correlation-id propagation, trace logging, and a
//! 30-second timeout before reaching handlers. Shutdown is cooperative:
//! the caller cancels the token and the server drains in-flight requests.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, handlers::ingest::MAX_PAYLOAD_SIZE, AppState};

/// Per-request wall-clock budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the correlation id that follows an event from ingest
/// into its row and log spans.
const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Creates the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ingest/{source_name}", post(handlers::ingest_event))
        .route("/admin/sources", post(handlers::create_source))
        .route("/admin/destinations", post(handlers::create_destination))
        .route("/admin/destinations/{destination_id}/rules", post(handlers::add_destination_rule))
        .route("/admin/events/{event_id}/deliveries", get(handlers::list_event_deliveries))
        // Limit above the ingest cap so the handler returns the structured
        // 413 body instead of the extractor's bare rejection.
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE + 1024))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(propagate_correlation_id))
        .with_state(state)
}

/// Ensures every request carries a correlation id and echoes it back.
///
/// The inbound `X-Correlation-Id` is kept when present; otherwise one is
/// minted here, so the ingest handler, the event row, the log spans, and
/// the response header all agree on one id.
async fn propagate_correlation_id(mut req: Request, next: Next) -> Response {
    let correlation_id = match req.headers().get(CORRELATION_ID_HEADER).cloned() {
        Some(value) => value,
        None => {
            let Ok(minted) = HeaderValue::from_str(&Uuid::new_v4().to_string()) else {
                return next.run(req).await;
            };
            req.headers_mut().insert(CORRELATION_ID_HEADER, minted.clone());
            minted
        },
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(CORRELATION_ID_HEADER, correlation_id);
    response
}

/// Serves the API until the shutdown token is cancelled.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or the server
/// fails while running.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "ingest server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("ingest server stopped");
    Ok(())
}
