use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use health::{HealthCheck, ProbeError};
use redis::aio::MultiplexedConnection;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{AsyncCommands, RedisConnectionInfo, RedisError};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MASTER_NAME: &str = "mymaster";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(RedisError),
}

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::Redis(err)
        }
    }
}

/// Where to reach the master of a Sentinel-monitored deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    /// Sentinel addresses, either `host:port` or full `redis://` URLs.
    pub addrs: Vec<String>,
    pub master_name: String,
    pub password: Option<String>,
    pub db: i64,
}

impl SentinelConfig {
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            addrs,
            master_name: DEFAULT_MASTER_NAME.to_string(),
            password: None,
            db: 0,
        }
    }

    pub fn with_master_name(mut self, master_name: impl Into<String>) -> Self {
        self.master_name = master_name.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }
}

enum Source {
    Direct(redis::Client),
    // The master is looked up again whenever the connection is reopened, which
    // is how a failover gets picked up.
    Sentinel {
        sentinel: Mutex<Sentinel>,
        master_name: String,
        node: SentinelNodeConnectionInfo,
    },
}

/// Redis client with a lazily opened multiplexed connection, either to a
/// single node or to the master currently advertised by Sentinel.
///
/// Every command, including connecting, is bounded by the configured timeout.
/// A connection that fails with an I/O error is dropped and reopened by the
/// next command.
pub struct RedisCache {
    source: Source,
    connection: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(addr: &str) -> Result<Self, CacheError> {
        Self::with_timeout(addr, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(addr: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(addr)?;
        Ok(Self::from_source(Source::Direct(client), timeout))
    }

    pub fn sentinel(config: SentinelConfig, timeout: Duration) -> Result<Self, CacheError> {
        let addrs: Vec<String> = config.addrs.iter().map(|addr| sentinel_url(addr)).collect();
        let sentinel = Sentinel::build(addrs)?;
        let node = SentinelNodeConnectionInfo {
            tls_mode: None,
            redis_connection_info: Some(RedisConnectionInfo {
                db: config.db,
                password: config.password,
                ..Default::default()
            }),
        };
        let source = Source::Sentinel {
            sentinel: Mutex::new(sentinel),
            master_name: config.master_name,
            node,
        };
        Ok(Self::from_source(source, timeout))
    }

    fn from_source(source: Source, timeout: Duration) -> Self {
        Self {
            source,
            connection: Mutex::new(None),
            timeout,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.source, Source::Sentinel { .. })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self
            .bounded(async {
                let mut conn = self.connection().await?;
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        debug!(reply = %pong, "redis ping");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<String, CacheError> {
        let value: Option<String> = self
            .bounded(async {
                let mut conn = self.connection().await?;
                conn.get(key).await
            })
            .await?;
        value.ok_or(CacheError::NotFound)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.set(key, value).await
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.del(key).await
        })
        .await
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RedisError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let client = match &self.source {
            Source::Direct(client) => client.clone(),
            Source::Sentinel {
                sentinel,
                master_name,
                node,
            } => {
                let client = sentinel
                    .lock()
                    .await
                    .async_master_for(master_name, Some(node))
                    .await?;
                debug!(master = %master_name, "resolved redis master through sentinel");
                client
            }
        };
        let conn = client.get_multiplexed_tokio_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_io_error() || err.is_connection_dropped() {
                    warn!("dropping redis connection: {err}");
                    *self.connection.lock().await = None;
                }
                Err(err.into())
            }
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

fn sentinel_url(addr: &str) -> String {
    match addr.contains("://") {
        true => addr.to_string(),
        false => format!("redis://{addr}"),
    }
}

#[async_trait]
impl HealthCheck for RedisCache {
    async fn check(&self) -> Result<(), ProbeError> {
        self.ping().await.map_err(ProbeError::new)
    }
}
