//! Repository for delivery rows.
//!
//! A delivery row is written once as `PENDING` during ingest, then updated
//! in place by the worker. The worker's status write always precedes the
//! broker acknowledgement; these updates are the durable half of that
//! ordering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Delivery, DeliveryId, DeliveryStatus, EventId},
};

/// Repository for delivery rows.
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

    /// Inserts a `PENDING` delivery row inside the ingest transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_pending_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery: &Delivery,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO deliveries (
                id, event_id, destination_id, status, attempts, max_attempts,
                last_error, last_attempt_at, delivered_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(delivery.id.0)
        .bind(delivery.event_id.0)
        .bind(delivery.destination_id.0)
        .bind(delivery.status.to_string())
        .bind(delivery.attempts)
        .bind(delivery.max_attempts)
        .bind(&delivery.last_error)
        .bind(delivery.last_attempt_at)
        .bind(delivery.delivered_at)
        .bind(delivery.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Records a successful delivery.
    ///
    /// `delivered_at` is captured by the caller after the 2xx response is
    /// received; this write must complete before the message is acked.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_delivered(
        &self,
        id: DeliveryId,
        attempts: i32,
        delivered_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = $1, attempts = $2, delivered_at = $3
            WHERE id = $4
            ",
        )
        .bind(DeliveryStatus::Delivered.to_string())
        .bind(attempts)
        .bind(delivered_at)
        .bind(id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed attempt, moving the row to `RETRYING` or `DEAD`.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_failed(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        attempts: i32,
        last_error: &str,
        last_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = $1, attempts = $2, last_error = $3, last_attempt_at = $4
            WHERE id = $5
            ",
        )
        .bind(status.to_string())
        .bind(attempts)
        .bind(last_error)
        .bind(last_attempt_at)
        .bind(id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a delivery by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, event_id, destination_id, status, attempts, max_attempts,
                   last_error, last_attempt_at, delivered_at, created_at
            FROM deliveries
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(delivery)
    }

    /// All deliveries created for one event.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_for_event(&self, event_id: EventId) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, event_id, destination_id, status, attempts, max_attempts,
                   last_error, last_attempt_at, delivered_at, created_at
            FROM deliveries
            WHERE event_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(event_id.0)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }
}
