//! WebhookHub relay service.
//!
//! One binary, two roles: `webhookhub ingest` serves the HTTP ingest and
//! admin API, `webhookhub worker` runs the delivery consumer, and no
//! argument runs both in one process for development. All process-wide
//! resources (pool, broker connection, HTTP client) are built here at
//! startup, handed to the entry points explicitly, and torn down in
//! reverse order on shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use webhookhub_api::{start_server, AppState, Config};
use webhookhub_broker::{Broker, JobPublisher};
use webhookhub_core::Storage;
use webhookhub_delivery::{DeliveryClient, DeliveryWorker, WorkerConfig};

/// Which roles this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ingest,
    Worker,
    All,
}

impl Mode {
    fn from_args() -> Result<Self> {
        match std::env::args().nth(1).as_deref() {
            None => Ok(Self::All),
            Some("ingest") => Ok(Self::Ingest),
            Some("worker") => Ok(Self::Worker),
            Some(other) => {
                anyhow::bail!("unknown mode '{other}'; expected 'ingest', 'worker', or no argument")
            },
        }
    }

    const fn runs_ingest(self) -> bool {
        matches!(self, Self::Ingest | Self::All)
    }

    const fn runs_worker(self) -> bool {
        matches!(self, Self::Worker | Self::All)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mode = Mode::from_args()?;
    info!(?mode, "starting webhookhub");

    let config = Config::load()?;
    info!(db_url = config.db_url_for_logging(), "configuration loaded");

    let pool = create_pool(&config, mode).await?;
    info!("database pool established");

    ensure_schema(&pool).await?;
    info!("schema ensured");

    // Both roles declare the topology; re-declaration is a no-op and
    // divergent arguments abort startup here.
    let broker = Broker::connect(&config.broker_settings()).await?;
    broker.ensure_topology().await?;
    info!("broker topology declared");

    let storage = Storage::new(pool.clone());
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();
    let mut http_client = None;

    if mode.runs_ingest() {
        let publisher = JobPublisher::new(broker.channel().clone());
        let state = AppState::new(storage.clone(), publisher);
        let addr = config.parse_listen_addr()?;
        let token = shutdown.clone();

        tasks.push(tokio::spawn(async move {
            if let Err(e) = start_server(state, addr, token).await {
                error!(error = %e, "ingest server failed");
            }
        }));
    }

    if mode.runs_worker() {
        let channel = broker.consumer_channel().await?;
        let publisher = JobPublisher::new(broker.channel().clone());
        let client = Arc::new(DeliveryClient::with_defaults()?);
        http_client = Some(client.clone());

        let worker = DeliveryWorker::new(
            channel,
            storage.clone(),
            client,
            publisher,
            WorkerConfig::default(),
        );
        let token = shutdown.clone();

        tasks.push(tokio::spawn(async move {
            if let Err(e) = worker.run(token).await {
                error!(error = %e, "delivery worker failed");
            }
        }));
    }

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    shutdown.cancel();

    // Reverse construction order: in-flight work first, then broker, HTTP
    // client, and pool. Unacked messages return to the broker when the
    // connection closes.
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task join failed during shutdown");
        }
    }

    if let Err(e) = broker.close().await {
        warn!(error = %e, "broker close failed");
    }

    drop(http_client);
    pool.close().await;

    info!("shutdown complete");
    Ok(())
}

/// Initializes tracing from `RUST_LOG`, defaulting to info.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,webhookhub=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Builds the connection pool sized for the roles this process runs.
async fn create_pool(config: &Config, mode: Mode) -> Result<sqlx::PgPool> {
    let max_connections = match mode {
        Mode::Ingest => config.ingest_pool_size,
        Mode::Worker => config.worker_pool_size,
        Mode::All => config.ingest_pool_size + config.worker_pool_size,
    };

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(config.pg_connect_options()?)
        .await
        .context("failed to connect to database")?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("failed to verify database connection")?;

    Ok(pool)
}

/// Creates the tables and indexes if they do not exist.
///
/// Idempotent; runs on every startup before serving.
async fn ensure_schema(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS sources (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            hmac_secret TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create sources table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS destinations (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            target_url TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create destinations table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS destination_rules (
            id UUID PRIMARY KEY,
            destination_id UUID NOT NULL REFERENCES destinations(id),
            source_name TEXT NOT NULL,
            event_type TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create destination_rules table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS events (
            id UUID PRIMARY KEY,
            source_name TEXT NOT NULL,
            event_type TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            payload_json BYTEA NOT NULL,
            correlation_id TEXT NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (source_name, idempotency_key)
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create events table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS deliveries (
            id UUID PRIMARY KEY,
            event_id UUID NOT NULL REFERENCES events(id),
            destination_id UUID NOT NULL REFERENCES destinations(id),
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            last_error TEXT,
            last_attempt_at TIMESTAMPTZ,
            delivered_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create deliveries table")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_destination_rules_selector
        ON destination_rules (source_name, event_type)
        ",
    )
    .execute(pool)
    .await
    .context("failed to create rule selector index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_event ON deliveries (event_id)")
        .execute(pool)
        .await
        .context("failed to create deliveries event index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deliveries_status ON deliveries (status, created_at)",
    )
    .execute(pool)
    .await
    .context("failed to create deliveries status index")?;

    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
