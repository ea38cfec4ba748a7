//! Repository for ingested events.
//!
//! The insert path is the idempotency boundary: `(source_name,
//! idempotency_key)` is unique, and a second insert fails atomically with
//! `CoreError::UniqueViolation`, which ingest maps to the duplicate path.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Event, EventId},
};

/// Repository for event rows.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new event inside the caller's ingest transaction.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UniqueViolation` when an event with the same
    /// `(source_name, idempotency_key)` already exists.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO events (
                id, source_name, event_type, idempotency_key,
                payload_json, correlation_id, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(event.id.0)
        .bind(&event.source_name)
        .bind(&event.event_type)
        .bind(&event.idempotency_key)
        .bind(&event.payload_json)
        .bind(&event.correlation_id)
        .bind(event.received_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Finds an event by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r"
            SELECT id, source_name, event_type, idempotency_key,
                   payload_json, correlation_id, received_at
            FROM events
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }
}
