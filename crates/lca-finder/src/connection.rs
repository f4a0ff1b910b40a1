//! PostgreSQL pool setup.
//!
//! Establishing the pool is the only step tried more than once:
//! `connect_attempts` tries with a fixed pause in between. Queries issued
//! through the finder are never retried.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument, warn};

use crate::config::env_parse;
use crate::{FinderError, Result};

/// Reported to the server as `application_name`.
const APPLICATION_NAME: &str = "lca-finder";

/// Pool sizing and connect behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
    /// Seconds before an idle connection is closed (None = never)
    pub idle_timeout_secs: Option<u64>,
    /// Tries before connecting gives up; at least 1
    pub connect_attempts: u32,
    /// Pause between two tries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: Some(600),
            connect_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl PoolConfig {
    /// Reads `LCA_DB_MIN_CONNECTIONS`, `LCA_DB_MAX_CONNECTIONS`,
    /// `LCA_DB_ACQUIRE_TIMEOUT_SECS` and `LCA_DB_CONNECT_ATTEMPTS`; unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            min_connections: env_parse("LCA_DB_MIN_CONNECTIONS", defaults.min_connections)?,
            max_connections: env_parse("LCA_DB_MAX_CONNECTIONS", defaults.max_connections)?,
            acquire_timeout_secs: env_parse(
                "LCA_DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            )?,
            connect_attempts: env_parse("LCA_DB_CONNECT_ATTEMPTS", defaults.connect_attempts)?,
            ..defaults
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(FinderError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(FinderError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.connect_attempts == 0 {
            return Err(FinderError::Configuration(
                "connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(self.idle_timeout_secs.map(Duration::from_secs))
    }
}

/// Database location plus pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Reads `DATABASE_URL` plus the pool variables.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| FinderError::Configuration("DATABASE_URL not set".to_string()))?;
        Ok(Self {
            url,
            pool: PoolConfig::from_env()?,
        })
    }
}

/// An established PostgreSQL pool.
#[derive(Clone)]
pub struct Connection {
    pool: PgPool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

impl Connection {
    /// Opens a pool to `uri`.
    ///
    /// # Errors
    ///
    /// `Configuration` for an empty or unparsable URI or an inconsistent
    /// [`PoolConfig`]; `Store` if every connect attempt fails.
    #[instrument(skip(uri, config), fields(
        max_connections = config.max_connections,
        connect_attempts = config.connect_attempts
    ))]
    pub async fn new(uri: &str, config: PoolConfig) -> Result<Self> {
        if uri.trim().is_empty() {
            return Err(FinderError::Configuration(
                "Connection URI cannot be empty".to_string(),
            ));
        }
        config.validate()?;

        let options = PgConnectOptions::from_str(uri)
            .map_err(|e| FinderError::Configuration(format!("Invalid connection URI: {}", e)))?
            .application_name(APPLICATION_NAME);

        let pool = connect(&config, options).await?;
        info!("Connection pool ready");
        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.url, config.pool.clone()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips `SELECT 1`.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn connect(config: &PoolConfig, options: PgConnectOptions) -> Result<PgPool> {
    let mut attempt = 1;
    loop {
        match config.pool_options().connect_with(options.clone()).await {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < config.connect_attempts => {
                warn!(attempt, error = %e, "Connecting to PostgreSQL failed, retrying");
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(FinderError::from(e)),
        }
    }
}
