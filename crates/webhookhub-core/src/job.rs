//! On-wire delivery job codec.
//!
//! A `DeliveryJob` is the transient broker message carrying one pending
//! attempt. The queue is never the source of truth: a job only schedules
//! work against an already-persisted delivery row.

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    models::{DeliveryId, EventId},
};

/// One pending delivery attempt, JSON-encoded on the broker wire.
///
/// Field names are part of the wire contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    /// Delivery row this attempt belongs to.
    pub delivery_id: DeliveryId,

    /// Event being delivered.
    pub event_id: EventId,

    /// Destination URL, copied onto the wire so the worker needs no
    /// destination lookup.
    pub target_url: String,

    /// Raw event payload, passed through byte-for-byte.
    pub payload_json: String,

    /// Attempt number this job represents, starting at 1.
    pub attempt: u32,
}

impl DeliveryJob {
    /// Serializes the job to compact JSON bytes for publishing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Codec` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::Codec(e.to_string()))
    }

    /// Decodes a job from broker message bytes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Codec` on malformed JSON or missing fields;
    /// the worker treats that as poison and dead-letters the message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Codec(e.to_string()))
    }

    /// Copy of this job for the next scheduled attempt.
    pub fn next_attempt(&self) -> Self {
        Self { attempt: self.attempt + 1, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn sample_job() -> DeliveryJob {
        DeliveryJob {
            delivery_id: DeliveryId(Uuid::nil()),
            event_id: EventId(Uuid::nil()),
            target_url: "https://example.com/hook".to_string(),
            payload_json: r#"{"ref":"main"}"#.to_string(),
            attempt: 1,
        }
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let bytes = sample_job().encode().expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");

        let obj = value.as_object().expect("object");
        assert!(obj.contains_key("deliveryId"));
        assert!(obj.contains_key("eventId"));
        assert!(obj.contains_key("targetUrl"));
        assert!(obj.contains_key("payloadJson"));
        assert_eq!(obj.get("attempt").and_then(serde_json::Value::as_u64), Some(1));
    }

    #[test]
    fn payload_survives_codec_untouched() {
        let mut job = sample_job();
        job.payload_json = "{\"text\":\"tabs\\tand \\u00fcnicode\"}".to_string();

        let decoded = DeliveryJob::decode(&job.encode().expect("encode")).expect("decode");
        assert_eq!(decoded.payload_json, job.payload_json);
    }

    #[test]
    fn malformed_message_is_a_codec_error() {
        let err = DeliveryJob::decode(b"{\"deliveryId\":\"not-a-uuid\"}").unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));

        let err = DeliveryJob::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
    }

    #[test]
    fn next_attempt_increments_only_the_counter() {
        let job = sample_job();
        let next = job.next_attempt();

        assert_eq!(next.attempt, 2);
        assert_eq!(next.delivery_id, job.delivery_id);
        assert_eq!(next.target_url, job.target_url);
        assert_eq!(next.payload_json, job.payload_json);
    }
}
