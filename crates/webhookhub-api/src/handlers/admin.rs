//! Admin CRUD: sources, destinations, rules, and delivery audit reads.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use webhookhub_core::{
    Delivery, Destination, DestinationId, DestinationRule, EventId, RuleId, Source, SourceId,
};

use crate::{crypto, error::ApiError, AppState};

const MAX_NAME_LEN: usize = 100;

/// Request body for registering a source.
#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    /// Unique source name.
    pub name: String,
}

/// Response for a newly registered source.
///
/// The only surface that ever exposes the signing secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSourceResponse {
    /// Assigned id.
    pub id: SourceId,
    /// Source name.
    pub name: String,
    /// 64-char lowercase hex signing secret. Shown once.
    pub hmac_secret: String,
    /// Whether the source may post events.
    pub active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// One routing rule in a destination request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Source name to match.
    pub source_name: String,
    /// Event type to match.
    pub event_type: String,
}

/// Request body for registering a destination.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDestinationRequest {
    /// Destination name.
    pub name: String,
    /// Target URL; http or https with a host.
    pub target_url: String,
    /// At least one routing rule.
    pub rules: Vec<RuleSpec>,
}

/// Response for a registered destination, rules included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResponse {
    /// The destination row.
    #[serde(flatten)]
    pub destination: Destination,
    /// Rules owned by the destination.
    pub rules: Vec<DestinationRule>,
}

/// Registers a new source and returns its secret, once.
#[instrument(name = "create_source", skip_all, fields(source_name = %request.name))]
pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<(StatusCode, Json<CreateSourceResponse>), ApiError> {
    validate_name(&request.name)?;

    let source = Source {
        id: SourceId::new(),
        name: request.name,
        hmac_secret: crypto::generate_secret(),
        active: true,
        created_at: Utc::now(),
    };

    state.storage.sources.create(&source).await.map_err(|e| {
        if e.is_unique_violation() {
            ApiError::Conflict(format!("source name already registered: {}", source.name))
        } else {
            e.into()
        }
    })?;

    info!(source_id = %source.id, "source registered");
    Ok((
        StatusCode::CREATED,
        Json(CreateSourceResponse {
            id: source.id,
            name: source.name,
            hmac_secret: source.hmac_secret,
            active: source.active,
            created_at: source.created_at,
        }),
    ))
}

/// Registers a destination with its initial rule set.
#[instrument(name = "create_destination", skip_all, fields(destination_name = %request.name))]
pub async fn create_destination(
    State(state): State<AppState>,
    Json(request): Json<CreateDestinationRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>), ApiError> {
    validate_name(&request.name)?;
    validate_target_url(&request.target_url)?;

    if request.rules.is_empty() {
        return Err(ApiError::Validation("a destination needs at least one rule".into()));
    }

    let destination = Destination {
        id: DestinationId::new(),
        name: request.name,
        target_url: request.target_url,
        active: true,
        created_at: Utc::now(),
    };

    let rules: Vec<DestinationRule> = request
        .rules
        .iter()
        .map(|spec| validate_rule_spec(spec, destination.id))
        .collect::<Result<_, _>>()?;

    state.storage.destinations.create_with_rules(&destination, &rules).await?;

    info!(destination_id = %destination.id, rules = rules.len(), "destination registered");
    Ok((StatusCode::CREATED, Json(DestinationResponse { destination, rules })))
}

/// Appends one rule to an existing destination.
#[instrument(name = "add_destination_rule", skip_all, fields(destination_id = %destination_id))]
pub async fn add_destination_rule(
    Path(destination_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(spec): Json<RuleSpec>,
) -> Result<(StatusCode, Json<DestinationRule>), ApiError> {
    let destination_id = DestinationId::from(destination_id);

    state
        .storage
        .destinations
        .find_by_id(destination_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown destination: {destination_id}")))?;

    let rule = validate_rule_spec(&spec, destination_id)?;
    state.storage.destinations.add_rule(&rule).await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// Read-only audit view of an event's deliveries.
pub async fn list_event_deliveries(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Delivery>>, ApiError> {
    let event_id = EventId::from(event_id);

    state
        .storage
        .events
        .find_by_id(event_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown event: {event_id}")))?;

    let deliveries = state.storage.deliveries.list_for_event(event_id).await?;
    Ok(Json(deliveries))
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be blank".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!("name must be at most {MAX_NAME_LEN} characters")));
    }
    Ok(())
}

fn validate_target_url(target_url: &str) -> Result<(), ApiError> {
    let parsed = url::Url::parse(target_url)
        .map_err(|e| ApiError::Validation(format!("invalid target url: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::Validation("target url must use http or https".into()));
    }
    if parsed.host_str().is_none() {
        return Err(ApiError::Validation("target url must have a host".into()));
    }
    Ok(())
}

fn validate_rule_spec(
    spec: &RuleSpec,
    destination_id: DestinationId,
) -> Result<DestinationRule, ApiError> {
    if spec.source_name.trim().is_empty() || spec.event_type.trim().is_empty() {
        return Err(ApiError::Validation("rule sourceName and eventType must not be blank".into()));
    }

    Ok(DestinationRule {
        id: RuleId::new(),
        destination_id,
        source_name: spec.source_name.clone(),
        event_type: spec.event_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_overlong_names_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
        assert!(validate_name(&"x".repeat(100)).is_ok());
        assert!(validate_name("github").is_ok());
    }

    #[test]
    fn target_url_must_be_http_with_host() {
        assert!(validate_target_url("https://example.com/hook").is_ok());
        assert!(validate_target_url("http://10.0.0.1:9000/hook").is_ok());

        assert!(validate_target_url("ftp://example.com/hook").is_err());
        assert!(validate_target_url("not a url").is_err());
        assert!(validate_target_url("https://").is_err());
    }

    #[test]
    fn rule_spec_requires_both_selectors() {
        let destination_id = DestinationId::new();
        let blank_source =
            RuleSpec { source_name: " ".to_string(), event_type: "push".to_string() };
        let blank_type = RuleSpec { source_name: "github".to_string(), event_type: String::new() };
        let valid = RuleSpec { source_name: "github".to_string(), event_type: "push".to_string() };

        assert!(validate_rule_spec(&blank_source, destination_id).is_err());
        assert!(validate_rule_spec(&blank_type, destination_id).is_err());

        let rule = validate_rule_spec(&valid, destination_id).expect("valid rule");
        assert_eq!(rule.destination_id, destination_id);
        assert_eq!(rule.source_name, "github");
    }

    #[test]
    fn source_response_exposes_secret_in_camel_case() {
        let response = CreateSourceResponse {
            id: SourceId::new(),
            name: "github".to_string(),
            hmac_secret: "ab".repeat(32),
            active: true,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&response).expect("serialize");
        assert!(value.get("hmacSecret").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("hmac_secret").is_none());
    }
}
