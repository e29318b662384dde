use std::time::Duration;

use async_trait::async_trait;
use health::{HealthCheck, ProbeError};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Connection, Error as SqlxError,
};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_lifetime: Duration::from_secs(60), // Force refresh every minute
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] SqlxError),

    #[error("Client timeout error: {0}")]
    Timeout(#[source] SqlxError),

    #[error("Pg error: {0}")]
    Other(#[source] SqlxError),
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        if is_timeout_error(&err) {
            StoreError::Timeout(err)
        } else {
            StoreError::Other(err)
        }
    }
}

/// Postgres connection pool.
///
/// Connections are opened lazily, so creating a `Store` never touches the
/// network. Use [`Store::ping`] (or the health check) to verify the database
/// is reachable.
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(url: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .idle_timeout(options.idle_timeout)
            .max_lifetime(options.max_lifetime)
            .connect_lazy(url)
            .map_err(StoreError::InvalidUrl)?;
        debug!(max_connections = options.max_connections, "created postgres pool");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquires a connection from the pool and pings the server with it.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for Store {
    async fn check(&self) -> Result<(), ProbeError> {
        self.ping().await.map_err(ProbeError::new)
    }
}

/// Determines if a sqlx::Error represents a timeout-related failure
pub fn is_timeout_error(error: &SqlxError) -> bool {
    match error {
        // Pool acquisition timed out
        SqlxError::PoolTimedOut => true,

        // IO-level timeout (network/socket)
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => true,

        // Protocol text sometimes includes "timeout"
        SqlxError::Protocol(msg) => msg.to_lowercase().contains("timeout"),

        // Database-reported timeouts/cancels
        SqlxError::Database(db_error) => match db_error.code() {
            // 57014: query_canceled, 55P03: lock_not_available
            Some(code) => code.as_ref() == "57014" || code.as_ref() == "55P03",
            None => db_error.message().to_lowercase().contains("timeout"),
        },

        _ => false,
    }
}
