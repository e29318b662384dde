pub mod config;
pub mod kafka_consumer;
pub mod kafka_producer;
mod metadata;
pub mod test;

pub use kafka_consumer::{KafkaSubscriber, Offset, OffsetErr, RecvErr};
pub use kafka_producer::{KafkaContext, KafkaProduceError, KafkaPublisher};
pub use metadata::PingError;
