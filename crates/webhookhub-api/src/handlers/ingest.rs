//! Webhook ingest: authenticate, capture, fan out, enqueue.
//!
//! The committing boundary is strict: the event insert and all PENDING
//! delivery rows commit in one REPEATABLE READ transaction, and only a
//! successful commit is followed by job publishes. A publish failure
//! after commit leaves orphan PENDING rows behind (logged; an external
//! reconciler may republish them); re-ingesting the same event will hit
//! the idempotency guard and will not self-heal them.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use webhookhub_core::{
    CoreError, Delivery, DeliveryId, DeliveryJob, DeliveryStatus, Event, EventId,
    MAX_DELIVERY_ATTEMPTS,
};

use crate::{crypto, error::ApiError, AppState};

/// Ingest body limit: 10 MiB of raw payload.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Query parameters for ingest.
#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    /// Event type; required and non-blank.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// Response for an accepted (new or duplicate) ingest request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// Id of the newly captured event; absent on the duplicate path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// `accepted` or `duplicate`.
    pub status: String,
}

/// Ingests one inbound webhook event.
///
/// `POST /ingest/{source_name}?type={event_type}` with the raw payload as
/// the body and `X-Signature` carrying the lowercase hex HMAC-SHA256 of
/// the body. Both the new and the duplicate path answer `202 Accepted`.
#[instrument(
    name = "ingest_event",
    skip_all,
    fields(
        source_name = %source_name,
        event_type = tracing::field::Empty,
        correlation_id = tracing::field::Empty,
    )
)]
pub async fn ingest_event(
    Path(source_name): Path<String>,
    Query(query): Query<IngestQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let event_type = match query.event_type.as_deref().map(str::trim) {
        Some(event_type) if !event_type.is_empty() => event_type.to_string(),
        _ => return Err(ApiError::Validation("query parameter 'type' must not be blank".into())),
    };
    tracing::Span::current().record("event_type", event_type.as_str());

    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(ApiError::PayloadTooLarge(body.len()));
    }

    let source = state
        .storage
        .sources
        .find_by_name(&source_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown source: {source_name}")))?;

    if !source.active {
        warn!("inactive source rejected");
        return Err(ApiError::Unauthorized);
    }

    let provided_signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !crypto::verify_signature(&source.hmac_secret, &body, provided_signature) {
        warn!("signature verification failed");
        return Err(ApiError::Unauthorized);
    }

    let correlation_id = headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    let event = Event {
        id: EventId::new(),
        source_name: source_name.clone(),
        event_type: event_type.clone(),
        idempotency_key: crypto::derive_idempotency_key(&source_name, &event_type, &body),
        payload_json: body.to_vec(),
        correlation_id,
        received_at: Utc::now(),
    };

    let Some(created) = capture_and_fan_out(&state, &event).await? else {
        info!(idempotency_key = %event.idempotency_key, "DUPLICATE event, already captured");
        return Ok((
            StatusCode::ACCEPTED,
            Json(IngestResponse { event_id: None, status: "duplicate".to_string() }),
        ));
    };

    // Commit happened above; publishes come strictly after it.
    publish_jobs(&state, &event, &created).await?;

    info!(event_id = %event.id, deliveries = created.len(), "event captured");
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            event_id: Some(event.id.to_string()),
            status: "accepted".to_string(),
        }),
    ))
}

/// Inserts the event and its PENDING deliveries in one transaction.
///
/// Returns `None` when the idempotency constraint fires: the transaction
/// is rolled back harmlessly and no deliveries are (re-)created.
async fn capture_and_fan_out(
    state: &AppState,
    event: &Event,
) -> Result<Option<Vec<(Delivery, String)>>, ApiError> {
    let mut tx = state.storage.begin_ingest_tx().await?;

    match state.storage.events.insert_in_tx(&mut tx, event).await {
        Ok(()) => {},
        Err(e) if e.is_unique_violation() => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback after duplicate insert failed");
            }
            return Ok(None);
        },
        Err(e) => return Err(e.into()),
    }

    let destinations = state
        .storage
        .destinations
        .find_active_matching_in_tx(&mut tx, &event.source_name, &event.event_type)
        .await?;

    let mut created = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let delivery = Delivery {
            id: DeliveryId::new(),
            event_id: event.id,
            destination_id: destination.id,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: MAX_DELIVERY_ATTEMPTS as i32,
            last_error: None,
            last_attempt_at: None,
            delivered_at: None,
            created_at: Utc::now(),
        };
        state.storage.deliveries.create_pending_in_tx(&mut tx, &delivery).await?;
        created.push((delivery, destination.target_url));
    }

    tx.commit().await.map_err(CoreError::from)?;
    Ok(Some(created))
}

/// Publishes one first-attempt job per created delivery.
async fn publish_jobs(
    state: &AppState,
    event: &Event,
    created: &[(Delivery, String)],
) -> Result<(), ApiError> {
    let payload_json = String::from_utf8_lossy(&event.payload_json).into_owned();

    for (index, (delivery, target_url)) in created.iter().enumerate() {
        let job = DeliveryJob {
            delivery_id: delivery.id,
            event_id: event.id,
            target_url: target_url.clone(),
            payload_json: payload_json.clone(),
            attempt: 1,
        };

        if let Err(e) = state.publisher.publish_job(&job).await {
            let orphaned: Vec<String> =
                created[index..].iter().map(|(d, _)| d.id.to_string()).collect();
            error!(
                error = %e,
                event_id = %event.id,
                orphaned_deliveries = ?orphaned,
                "publish after commit failed; PENDING rows left for reconciliation"
            );
            return Err(e.into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_response_omits_event_id_for_duplicates() {
        let body = serde_json::to_value(IngestResponse {
            event_id: None,
            status: "duplicate".to_string(),
        })
        .expect("serialize");

        assert_eq!(body, serde_json::json!({"status": "duplicate"}));
    }

    #[test]
    fn ingest_response_carries_event_id_when_accepted() {
        let body = serde_json::to_value(IngestResponse {
            event_id: Some("4f3a".to_string()),
            status: "accepted".to_string(),
        })
        .expect("serialize");

        assert_eq!(body, serde_json::json!({"eventId": "4f3a", "status": "accepted"}));
    }
}
