use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use health::{HealthCheck, ProbeError};
use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::metadata::{check_topic, PingError};

/// JSON consumer subscribed to a single topic.
#[derive(Clone)]
pub struct KafkaSubscriber {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
    group: String,
    metadata_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Received empty payload")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

impl KafkaSubscriber {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            .set(
                "enable.auto.commit",
                consumer_config.kafka_consumer_auto_commit.to_string(),
            )
            .set(
                "auto.commit.interval.ms",
                consumer_config
                    .kafka_consumer_auto_commit_interval_ms
                    .to_string(),
            );

        client_config.set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        let inner = Inner {
            consumer,
            topic: consumer_config.kafka_consumer_topic,
            group: consumer_config.kafka_consumer_group,
            metadata_timeout: Duration::from_millis(common_config.kafka_metadata_timeout_ms),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn group(&self) -> &str {
        &self.inner.group
    }

    /// Waits for the next message and deserializes its JSON payload.
    ///
    /// Messages that cannot be decoded have their offset stored right away so
    /// they are not redelivered.
    pub async fn json_recv<T>(&self) -> Result<(T, Offset), RecvErr>
    where
        T: DeserializeOwned,
    {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            store_poison_pill(offset);
            return Err(RecvErr::Empty);
        };

        let payload = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                store_poison_pill(offset);
                return Err(RecvErr::Serde(e));
            }
        };

        Ok((payload, offset))
    }

    pub async fn ping(&self) -> Result<(), PingError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            check_topic(inner.consumer.client(), &inner.topic, inner.metadata_timeout)
        })
        .await?
    }
}

fn store_poison_pill(offset: Offset) {
    let (partition, position) = (offset.partition, offset.offset);
    if let Err(e) = offset.store() {
        warn!(partition, offset = position, "failed to store offset of undecodable message: {e}");
    }
}

#[async_trait]
impl HealthCheck for KafkaSubscriber {
    async fn check(&self) -> Result<(), ProbeError> {
        self.ping().await.map_err(ProbeError::new)
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use health::HealthCheck;
    use rdkafka::mocking::MockCluster;
    use rdkafka::producer::DefaultProducerContext;

    use crate::config::ConsumerConfig;
    use crate::test::test_config;
    use crate::KafkaSubscriber;

    #[tokio::test]
    async fn probe_reads_topic_metadata() {
        let cluster: MockCluster<'static, DefaultProducerContext> =
            MockCluster::new(1).expect("failed to create mock brokers");
        cluster.create_topic("jobs", 1, 1).unwrap();

        let config = test_config(cluster.bootstrap_servers());
        let subscriber =
            KafkaSubscriber::new(&config, ConsumerConfig::new("workers", "jobs")).unwrap();

        assert_eq!(subscriber.topic(), "jobs");
        assert_eq!(subscriber.group(), "workers");
        subscriber.check().await.expect("check should pass");
    }

    #[tokio::test]
    async fn probe_fails_without_broker() {
        let mut config = test_config("127.0.0.1:1".to_string());
        config.kafka_metadata_timeout_ms = 200;
        let subscriber =
            KafkaSubscriber::new(&config, ConsumerConfig::new("workers", "jobs")).unwrap();

        assert!(subscriber.check().await.is_err());
    }
}
