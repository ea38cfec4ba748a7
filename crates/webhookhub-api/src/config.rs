//! Configuration loaded from the environment.
//!
//! Database and broker credentials are required; there are no production
//! defaults for them and startup fails fast when one is missing. Tuning
//! knobs (listen address, pool sizes) carry defaults.

use std::{net::SocketAddr, str::FromStr};

use anyhow::{Context, Result};
use figment::{providers::Env, Figment};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use webhookhub_broker::BrokerSettings;

/// Process-wide configuration.
///
/// Environment variables map one-to-one onto fields: `DB_URL`, `DB_USER`,
/// `DB_PASSWORD`, `RABBITMQ_HOST`, `RABBITMQ_PORT`, `RABBITMQ_USER`,
/// `RABBITMQ_PASSWORD`, `RABBITMQ_VHOST`, plus optional `LISTEN_ADDR`,
/// `INGEST_POOL_SIZE`, and `WORKER_POOL_SIZE`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// PostgreSQL URL without credentials (e.g. `postgres://db:5432/webhookhub`).
    pub db_url: String,
    /// Database user.
    pub db_user: String,
    /// Database password. Never logged.
    pub db_password: String,

    /// Broker hostname.
    pub rabbitmq_host: String,
    /// Broker AMQP port.
    pub rabbitmq_port: u16,
    /// Broker user.
    pub rabbitmq_user: String,
    /// Broker password. Never logged.
    pub rabbitmq_password: String,
    /// Broker virtual host.
    pub rabbitmq_vhost: String,

    /// Ingest server bind address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Connection pool size for the ingest process.
    #[serde(default = "default_ingest_pool_size")]
    pub ingest_pool_size: u32,

    /// Connection pool size for the worker process.
    ///
    /// Matches the consumer prefetch so every in-flight message can
    /// acquire a connection.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error when a required variable is missing or malformed, or
    /// when validation fails.
    pub fn load() -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Env::prefixed(""))
            .extract()
            .context("failed to load configuration from environment")?;
        config.validate()?;
        Ok(config)
    }

    /// PostgreSQL connect options with credentials applied.
    ///
    /// # Errors
    ///
    /// Returns error if `DB_URL` does not parse.
    pub fn pg_connect_options(&self) -> Result<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.db_url)
            .context("invalid DB_URL")?
            .username(&self.db_user)
            .password(&self.db_password);
        Ok(options)
    }

    /// Broker settings for `webhookhub-broker`.
    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            host: self.rabbitmq_host.clone(),
            port: self.rabbitmq_port,
            user: self.rabbitmq_user.clone(),
            password: self.rabbitmq_password.clone(),
            vhost: self.rabbitmq_vhost.clone(),
        }
    }

    /// Parses the server bind address.
    ///
    /// # Errors
    ///
    /// Returns error if the address is malformed.
    pub fn parse_listen_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&self.listen_addr).context("invalid LISTEN_ADDR")
    }

    /// Database URL safe for logs (credentials are held separately and
    /// never interpolated).
    pub fn db_url_for_logging(&self) -> &str {
        &self.db_url
    }

    fn validate(&self) -> Result<()> {
        if self.rabbitmq_port == 0 {
            anyhow::bail!("RABBITMQ_PORT must be greater than 0");
        }
        if self.ingest_pool_size == 0 {
            anyhow::bail!("INGEST_POOL_SIZE must be greater than 0");
        }
        if self.worker_pool_size == 0 {
            anyhow::bail!("WORKER_POOL_SIZE must be greater than 0");
        }
        Ok(())
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ingest_pool_size() -> u32 {
    10
}

fn default_worker_pool_size() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    fn set_required(jail: &mut Jail) {
        jail.set_env("DB_URL", "postgres://db.internal:5432/webhookhub");
        jail.set_env("DB_USER", "hub");
        jail.set_env("DB_PASSWORD", "secret");
        jail.set_env("RABBITMQ_HOST", "mq.internal");
        jail.set_env("RABBITMQ_PORT", "5672");
        jail.set_env("RABBITMQ_USER", "hub");
        jail.set_env("RABBITMQ_PASSWORD", "secret");
        jail.set_env("RABBITMQ_VHOST", "/");
    }

    #[test]
    fn loads_with_required_variables_and_defaults() {
        Jail::expect_with(|jail| {
            set_required(jail);

            let config = Config::load().expect("config should load");
            assert_eq!(config.db_user, "hub");
            assert_eq!(config.listen_addr, "0.0.0.0:8080");
            assert_eq!(config.ingest_pool_size, 10);
            assert_eq!(config.worker_pool_size, 5);
            Ok(())
        });
    }

    #[test]
    fn missing_required_variable_fails() {
        Jail::expect_with(|jail| {
            // Everything except DB_URL.
            jail.set_env("DB_USER", "hub");
            jail.set_env("DB_PASSWORD", "secret");
            jail.set_env("RABBITMQ_HOST", "mq.internal");
            jail.set_env("RABBITMQ_PORT", "5672");
            jail.set_env("RABBITMQ_USER", "hub");
            jail.set_env("RABBITMQ_PASSWORD", "secret");
            jail.set_env("RABBITMQ_VHOST", "/");

            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn overrides_apply() {
        Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("LISTEN_ADDR", "127.0.0.1:9101");
            jail.set_env("INGEST_POOL_SIZE", "20");
            jail.set_env("WORKER_POOL_SIZE", "8");

            let config = Config::load().expect("config should load");
            assert_eq!(config.parse_listen_addr().expect("addr").port(), 9101);
            assert_eq!(config.ingest_pool_size, 20);
            assert_eq!(config.worker_pool_size, 8);
            Ok(())
        });
    }

    #[test]
    fn zero_pool_size_rejected() {
        Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("WORKER_POOL_SIZE", "0");

            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn broker_settings_carry_credentials() {
        Jail::expect_with(|jail| {
            set_required(jail);

            let settings = Config::load().expect("config").broker_settings();
            assert_eq!(settings.host, "mq.internal");
            assert_eq!(settings.port, 5672);
            assert_eq!(settings.vhost, "/");
            Ok(())
        });
    }
}
