//! Repository for source registration and lookup.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Source, SourceId},
};

/// Repository for source rows.
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

    /// Registers a new source.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UniqueViolation` if the name is already taken.
    pub async fn create(&self, source: &Source) -> Result<SourceId> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO sources (id, name, hmac_secret, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(source.id.0)
        .bind(&source.name)
        .bind(&source.hmac_secret)
        .bind(source.active)
        .bind(source.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(SourceId(id))
    }

    /// Looks up a source by its unique name.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            "SELECT id, name, hmac_secret, active, created_at FROM sources WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(source)
    }
}
