use std::str::FromStr;
use std::time::Duration;

use common_kafka::config::KafkaConfig;
use common_redis::SentinelConfig;
use envconfig::Envconfig;
use lifecycle::{ServerOptions, TlsConfig};

use crate::error::ContainerError;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(from = "READ_TIMEOUT_MS", default = "30000")]
    pub read_timeout: EnvMsDuration,

    #[envconfig(from = "WRITE_TIMEOUT_MS", default = "30000")]
    pub write_timeout: EnvMsDuration,

    #[envconfig(from = "DRAIN_TIMEOUT_MS", default = "5000")]
    pub drain_timeout: EnvMsDuration,

    #[envconfig(from = "TLS_CERT_FILE")]
    pub tls_cert_file: Option<NonEmptyString>,

    #[envconfig(from = "TLS_KEY_FILE")]
    pub tls_key_file: Option<NonEmptyString>,

    #[envconfig(from = "EXPORT_PROMETHEUS", default = "true")]
    pub export_prometheus: bool,

    #[envconfig(from = "LOG_FORMAT", default = "text")]
    pub log_format: LogFormat,

    #[envconfig(from = "REDIS_URL")]
    pub redis_url: Option<NonEmptyString>,

    /// Comma separated Sentinel addresses, takes precedence over `REDIS_URL`.
    #[envconfig(from = "REDIS_SENTINEL_ADDRS")]
    pub redis_sentinel_addrs: Option<AddrList>,

    #[envconfig(from = "REDIS_MASTER_NAME", default = "mymaster")]
    pub redis_master_name: String,

    #[envconfig(from = "REDIS_PASSWORD")]
    pub redis_password: Option<NonEmptyString>,

    #[envconfig(from = "REDIS_DB", default = "0")]
    pub redis_db: i64,

    #[envconfig(from = "DATABASE_URL")]
    pub database_url: Option<NonEmptyString>,

    #[envconfig(from = "MAX_PG_CONNECTIONS", default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(from = "PUBLISHER_TOPIC")]
    pub publisher_topic: Option<NonEmptyString>,

    #[envconfig(from = "SUBSCRIBER_TOPIC")]
    pub subscriber_topic: Option<NonEmptyString>,

    #[envconfig(from = "SUBSCRIBER_GROUP", default = "container")]
    pub subscriber_group: String,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tls(&self) -> Result<Option<TlsConfig>, ContainerError> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Ok(Some(TlsConfig::new(cert.as_str(), key.as_str()))),
            (None, None) => Ok(None),
            _ => Err(ContainerError::IncompleteTls),
        }
    }

    /// Sentinel settings, when the cache is reached through Sentinel.
    pub fn redis_sentinel(&self) -> Option<SentinelConfig> {
        let addrs = self.redis_sentinel_addrs.as_ref()?;
        let mut config = SentinelConfig::new(addrs.0.clone())
            .with_master_name(self.redis_master_name.as_str())
            .with_db(self.redis_db);
        if let Some(password) = &self.redis_password {
            config = config.with_password(password.as_str());
        }
        Some(config)
    }

    pub fn server_options(&self) -> Result<ServerOptions, ContainerError> {
        let mut options = ServerOptions::default()
            .with_addr(self.bind())
            .with_read_timeout(self.read_timeout.0)
            .with_write_timeout(self.write_timeout.0)
            .with_drain_timeout(self.drain_timeout.0);
        if let Some(tls) = self.tls()? {
            options = options.with_tls(tls);
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrList(pub Vec<String>);

impl FromStr for AddrList {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addrs: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_owned)
            .collect();
        match addrs.is_empty() {
            true => Err(StringIsEmptyError),
            false => Ok(AddrList(addrs)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLogFormatError;

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ParseLogFormatError),
        }
    }
}
