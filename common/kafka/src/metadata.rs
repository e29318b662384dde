use std::time::Duration;

use rdkafka::client::Client;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::ClientContext;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingError {
    #[error("failed to contact broker: {0}")]
    Broker(#[from] KafkaError),
    #[error("failed to read topic {topic}: {reason}")]
    Topic { topic: String, reason: String },
    #[error("metadata request did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Fetches the metadata of `topic` and fails if the broker cannot be reached
/// or reports an error for the topic. Blocks the calling thread for up to
/// `timeout`, run it through `spawn_blocking`.
pub(crate) fn check_topic<C: ClientContext>(
    client: &Client<C>,
    topic: &str,
    timeout: Duration,
) -> Result<(), PingError> {
    let metadata = client.fetch_metadata(Some(topic), timeout)?;

    for t in metadata.topics() {
        if let Some(err) = t.error() {
            return Err(PingError::Topic {
                topic: t.name().to_string(),
                reason: RDKafkaErrorCode::from(err).to_string(),
            });
        }
    }
    Ok(())
}
