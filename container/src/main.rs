use std::convert::Infallible;

use axum::Router;
use common_database::{Store, StoreOptions};
use common_kafka::config::ConsumerConfig;
use common_kafka::{KafkaPublisher, KafkaSubscriber};
use common_redis::{RedisCache, DEFAULT_TIMEOUT};
use container::config::{Config, LogFormat};
use container::{
    action, with_cache, with_config, with_metrics, with_publisher, with_router, with_server,
    with_store, with_subscriber, BackendKind, ConfigAction, Container,
};
use envconfig::Envconfig;
use eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const BACKEND_NAME: &str = "main";

fn init_tracing(format: LogFormat) {
    // stdout with a level configured by the RUST_LOG envvar (default=INFO)
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let text = (format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer());
    let json = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

fn backends(config: &Config) -> Result<Vec<ConfigAction>> {
    let mut actions = Vec::new();

    if let Some(sentinel) = config.redis_sentinel() {
        let cache = RedisCache::sentinel(sentinel, DEFAULT_TIMEOUT)?;
        actions.push(with_cache(BACKEND_NAME, cache));
    } else if let Some(url) = &config.redis_url {
        actions.push(with_cache(BACKEND_NAME, RedisCache::new(url.as_str())?));
    }
    if let Some(url) = &config.database_url {
        let options = StoreOptions {
            max_connections: config.max_pg_connections,
            ..StoreOptions::default()
        };
        actions.push(with_store(BACKEND_NAME, Store::new(url.as_str(), options)?));
    }
    if let Some(topic) = &config.publisher_topic {
        let publisher = KafkaPublisher::new(&config.kafka, topic.as_str())?;
        actions.push(with_publisher(BACKEND_NAME, publisher));
    }
    if let Some(topic) = &config.subscriber_topic {
        let consumer_config = ConsumerConfig::new(&config.subscriber_group, topic.as_str());
        let subscriber = KafkaSubscriber::new(&config.kafka, consumer_config)?;
        actions.push(with_subscriber(BACKEND_NAME, subscriber));
    }

    Ok(actions)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()?;
    init_tracing(config.log_format);

    let mut actions = vec![with_config(config.clone()), with_router(Router::new())];
    if config.export_prometheus {
        actions.push(with_metrics());
    }
    actions.extend(backends(&config)?);
    actions.push(with_server(config.server_options()?));

    let container = Container::new(actions)?;
    for kind in [
        BackendKind::Cache,
        BackendKind::Store,
        BackendKind::Producer,
        BackendKind::Consumer,
    ] {
        for name in container.registry().names(kind) {
            info!(%kind, name, "backend configured");
        }
    }

    let shutdown = CancellationToken::new();
    let health = container.health().clone();
    container
        .run(
            &shutdown,
            vec![action(move |_| async move {
                let status = health.readiness().await;
                if !status.healthy {
                    warn!(failing = ?status.failing(), "starting while not ready");
                }
                Ok::<(), Infallible>(())
            })],
        )
        .await?;

    container.serve(shutdown).await?;
    info!("shutdown complete");
    Ok(())
}
