//! Repository for destinations and their routing rules.
//!
//! Fan-out matching happens here: given a `(source_name, event_type)`
//! pair, return the active destinations whose rule set contains it.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Destination, DestinationId, DestinationRule, RuleId},
};

/// Repository for destination and rule rows.
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

    /// Registers a destination together with its initial rules, atomically.
    ///
    /// # Errors
    ///
    /// Returns error if any insert fails; nothing is persisted in that case.
    pub async fn create_with_rules(
        &self,
        destination: &Destination,
        rules: &[DestinationRule],
    ) -> Result<DestinationId> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO destinations (id, name, target_url, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(destination.id.0)
        .bind(&destination.name)
        .bind(&destination.target_url)
        .bind(destination.active)
        .bind(destination.created_at)
        .execute(&mut *tx)
        .await?;

        for rule in rules {
            Self::insert_rule(&mut tx, rule).await?;
        }

        tx.commit().await?;
        Ok(destination.id)
    }

    /// Appends one rule to an existing destination.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConstraintViolation` if the destination does not
    /// exist (foreign key).
    pub async fn add_rule(&self, rule: &DestinationRule) -> Result<RuleId> {
        let mut tx = self.pool.begin().await?;
        Self::insert_rule(&mut tx, rule).await?;
        tx.commit().await?;
        Ok(rule.id)
    }

    async fn insert_rule(tx: &mut Transaction<'_, Postgres>, rule: &DestinationRule) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO destination_rules (id, destination_id, source_name, event_type)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(rule.id.0)
        .bind(rule.destination_id.0)
        .bind(&rule.source_name)
        .bind(&rule.event_type)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Finds a destination by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: DestinationId) -> Result<Option<Destination>> {
        let destination = sqlx::query_as::<_, Destination>(
            "SELECT id, name, target_url, active, created_at FROM destinations WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(destination)
    }

    /// All rules owned by a destination.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn rules_for(&self, id: DestinationId) -> Result<Vec<DestinationRule>> {
        let rules = sqlx::query_as::<_, DestinationRule>(
            r"
            SELECT id, destination_id, source_name, event_type
            FROM destination_rules
            WHERE destination_id = $1
            ",
        )
        .bind(id.0)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rules)
    }

    /// Active destinations whose rule set contains `(source_name, event_type)`.
    ///
    /// Runs inside the caller's ingest transaction so the fan-out sees a
    /// consistent snapshot with the event insert. Duplicate rules collapse
    /// to one destination.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_matching_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        source_name: &str,
        event_type: &str,
    ) -> Result<Vec<Destination>> {
        let destinations = sqlx::query_as::<_, Destination>(
            r"
            SELECT DISTINCT d.id, d.name, d.target_url, d.active, d.created_at
            FROM destinations d
            JOIN destination_rules r ON r.destination_id = d.id
            WHERE d.active
              AND r.source_name = $1
              AND r.event_type = $2
            ",
        )
        .bind(source_name)
        .bind(event_type)
        .fetch_all(&mut **tx)
        .await?;

        Ok(destinations)
    }
}
