//! Domain entities and strongly-typed identifiers.
//!
//! Defines sources, destinations, routing rules, events, and deliveries,
//! plus newtype UUID wrappers so the compiler keeps the id spaces apart.
//! Includes the delivery status state machine used across ingest and the
//! worker.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed source identifier.
///
/// Wraps a UUID to prevent mixing with other id types. Sources are
/// immutable after creation apart from the `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    /// Creates a new random source id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SourceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for SourceId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for SourceId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for SourceId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed destination identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationId(pub Uuid);

impl DestinationId {
    /// Creates a new random destination id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DestinationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DestinationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DestinationId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DestinationId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DestinationId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed routing-rule identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub Uuid);

impl RuleId {
    /// Creates a new random rule id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RuleId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for RuleId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for RuleId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for RuleId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed event identifier.
///
/// Generated at ingest time; appears unchanged in logs and on the job wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Creates a new random delivery id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// An external system allowed to POST events.
///
/// The HMAC secret is generated at creation and returned exactly once by
/// the admin API; it is never serialized back out of this crate.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Source {
    /// Unique identifier.
    pub id: SourceId,

    /// Unique, non-empty name, at most 100 chars.
    pub name: String,

    /// 64-char lowercase hex signing secret.
    ///
    /// Used as-is (ASCII bytes of the hex string) as the HMAC key; the
    /// string is the key, not the bytes it encodes.
    pub hmac_secret: String,

    /// Inactive sources are rejected at ingest with an authorization error.
    pub active: bool,

    /// When this source was registered.
    pub created_at: DateTime<Utc>,
}

/// An HTTP receiver with routing rules.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Unique identifier.
    pub id: DestinationId,

    /// Non-empty name, at most 100 chars. Not unique.
    pub name: String,

    /// Target URL for delivery; must be http/https with a host.
    pub target_url: String,

    /// Inactive destinations are skipped during fan-out.
    pub active: bool,

    /// When this destination was registered.
    pub created_at: DateTime<Utc>,
}

/// One `(source_name, event_type)` selector owned by a destination.
///
/// Order is not significant and duplicates are tolerated; fan-out
/// deduplicates by destination.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRule {
    /// Unique identifier.
    pub id: RuleId,

    /// Owning destination.
    pub destination_id: DestinationId,

    /// Source name to match.
    pub source_name: String,

    /// Event type to match.
    pub event_type: String,
}

/// One ingested inbound webhook.
///
/// The payload is the raw request body, stored verbatim and re-emitted
/// byte-for-byte to destinations. `(source_name, idempotency_key)` is
/// unique; the constraint is the sole arbiter of dedup under concurrent
/// identical requests.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Event {
    /// Unique identifier, generated at ingest.
    pub id: EventId,

    /// Name of the source that posted this event.
    pub source_name: String,

    /// Event type from the ingest query string.
    pub event_type: String,

    /// Natural key for dedup within a source.
    pub idempotency_key: String,

    /// Raw request body bytes.
    pub payload_json: Vec<u8>,

    /// Opaque correlation id propagated from the ingest request.
    pub correlation_id: String,

    /// When the event was first received.
    pub received_at: DateTime<Utc>,
}

/// Delivery lifecycle status.
///
/// Transitions are monotone away from `Pending`; `Delivered` and `Dead`
/// are terminal.
///
/// ```text
/// PENDING ──success──► DELIVERED
///    │
///    └─failure─► RETRYING ──success──► DELIVERED
///                   │
///                   └─ non-retryable or attempts exhausted ─► DEAD
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Row created at ingest, job not yet attempted.
    Pending,

    /// At least one attempt failed retryably; a retry is scheduled on the
    /// broker.
    Retrying,

    /// A 2xx response was received. Terminal.
    Delivered,

    /// Non-retryable failure or attempts exhausted. Terminal.
    Dead,
}

impl DeliveryStatus {
    /// True for `Delivered` and `Dead`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dead)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Retrying => write!(f, "RETRYING"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Dead => write!(f, "DEAD"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "PENDING" => Ok(Self::Pending),
            "RETRYING" => Ok(Self::Retrying),
            "DELIVERED" => Ok(Self::Delivered),
            "DEAD" => Ok(Self::Dead),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// One scheduled attempt-set targeting one destination for one event.
///
/// Written exactly once as `PENDING` at ingest, then updated in place by
/// the worker. Re-ingesting the same event never creates a second row for
/// the same `(event_id, destination_id)` pair.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Unique identifier, generated at ingest.
    pub id: DeliveryId,

    /// Event being delivered.
    pub event_id: EventId,

    /// Target destination.
    pub destination_id: DestinationId,

    /// Current state-machine position.
    pub status: DeliveryStatus,

    /// Attempts made so far. Zero until the first attempt is recorded.
    pub attempts: i32,

    /// Attempt ceiling recorded at creation.
    pub max_attempts: i32,

    /// Message from the most recent failure, if any.
    pub last_error: Option<String>,

    /// When the most recent attempt finished.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// When the 2xx response was received. Set iff status is `DELIVERED`.
    pub delivered_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_status_display_matches_column_values() {
        assert_eq!(DeliveryStatus::Pending.to_string(), "PENDING");
        assert_eq!(DeliveryStatus::Retrying.to_string(), "RETRYING");
        assert_eq!(DeliveryStatus::Delivered.to_string(), "DELIVERED");
        assert_eq!(DeliveryStatus::Dead.to_string(), "DEAD");
    }

    #[test]
    fn terminal_states_identified() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Dead.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Retrying.is_terminal());
    }

    #[test]
    fn ids_display_as_plain_uuids() {
        let raw = Uuid::new_v4();
        assert_eq!(EventId::from(raw).to_string(), raw.to_string());
        assert_eq!(DeliveryId::from(raw).to_string(), raw.to_string());
    }
}
