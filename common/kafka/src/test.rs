use rdkafka::mocking::MockCluster;
use rdkafka::producer::DefaultProducerContext;

use crate::config::KafkaConfig;
use crate::kafka_producer::KafkaPublisher;

pub fn test_config(hosts: String) -> KafkaConfig {
    KafkaConfig {
        kafka_producer_linger_ms: 0,
        kafka_producer_queue_mib: 50,
        kafka_producer_queue_messages: 1000,
        kafka_message_timeout_ms: 5000,
        kafka_compression_codec: "none".to_string(),
        kafka_metadata_timeout_ms: 5000,
        kafka_tls: false,
        kafka_hosts: hosts,
    }
}

pub async fn create_mock_kafka(
    topic: &str,
) -> (MockCluster<'static, DefaultProducerContext>, KafkaPublisher) {
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");
    let config = test_config(cluster.bootstrap_servers());

    let publisher =
        KafkaPublisher::new(&config, topic).expect("failed to create mocked kafka producer");
    (cluster, publisher)
}
