//! Repository layer over PostgreSQL.
//!
//! All database access goes through these repositories; SQL outside this
//! module is limited to the schema bootstrap in the binary. Repositories
//! translate row shapes into domain models and surface constraint
//! violations as typed errors.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

pub mod deliveries;
pub mod destinations;
pub mod events;
pub mod sources;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for registered sources.
    pub sources: Arc<sources::Repository>,

    /// Repository for destinations and their routing rules.
    pub destinations: Arc<destinations::Repository>,

    /// Repository for ingested events.
    pub events: Arc<events::Repository>,

    /// Repository for delivery rows.
    pub deliveries: Arc<deliveries::Repository>,
}

impl Storage {
    /// Creates a new storage instance over the given pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            sources: Arc::new(sources::Repository::new(pool.clone())),
            destinations: Arc::new(destinations::Repository::new(pool.clone())),
            events: Arc::new(events::Repository::new(pool.clone())),
            deliveries: Arc::new(deliveries::Repository::new(pool)),
        }
    }

    /// Shared handle to the underlying pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.events.pool()
    }

    /// Opens the ingest transaction at REPEATABLE READ.
    ///
    /// The elevated level keeps the destination fan-out consistent with
    /// the event insert under the unique-key race.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the transaction cannot start.
    pub async fn begin_ingest_tx(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Round-trips a trivial query to verify database connectivity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool()).await?;
        Ok(())
    }
}
