use std::time::Duration;

use async_trait::async_trait;
use health::{HealthCheck, ProbeError};
use metrics::gauge;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde::Serialize;
use serde_json::error::Error as SerdeError;
use thiserror::Error;
use tracing::debug;

use crate::config::KafkaConfig;
use crate::metadata::{check_topic, PingError};

pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
        gauge!("kafka_producer_queue_bytes_limit").set(stats.msg_size_max as f64);
    }
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: SerdeError },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// JSON producer bound to a single topic.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    topic: String,
    metadata_timeout: Duration,
}

impl KafkaPublisher {
    /// Creates the producer. No broker is contacted until the first publish
    /// or health check.
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set(
                "compression.codec",
                config.kafka_compression_codec.to_owned(),
            )
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            )
            .set(
                "queue.buffering.max.messages",
                config.kafka_producer_queue_messages.to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> = client_config.create_with_context(KafkaContext)?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            metadata_timeout: Duration::from_millis(config.kafka_metadata_timeout_ms),
        })
    }

    pub fn producer(&self) -> &FutureProducer<KafkaContext> {
        &self.producer
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serializes `payload` as JSON and waits for the delivery report.
    pub async fn publish<T: Serialize>(
        &self,
        key: Option<&str>,
        payload: &T,
    ) -> Result<(), KafkaProduceError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| KafkaProduceError::SerializationError { error: e })?;

        let record = FutureRecord {
            topic: &self.topic,
            key,
            payload: Some(&payload),
            timestamp: None,
            partition: None,
            headers: None,
        };

        let delivery = match self.producer.send_result(record) {
            Ok(f) => f,
            Err((e, _)) => return Err(KafkaProduceError::KafkaProduceError { error: e }),
        };

        match delivery.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err((e, _))) => Err(KafkaProduceError::KafkaProduceError { error: e }),
            Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
        }
    }

    /// Fails if the brokers cannot be reached or the topic metadata carries
    /// an error.
    pub async fn ping(&self) -> Result<(), PingError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || check_topic(producer.client(), &topic, timeout)).await?
    }
}

#[async_trait]
impl HealthCheck for KafkaPublisher {
    async fn check(&self) -> Result<(), ProbeError> {
        self.ping().await.map_err(ProbeError::new)
    }
}
