use std::fmt;

use common_database::Store;
use common_kafka::{KafkaPublisher, KafkaSubscriber};
use common_redis::RedisCache;

use crate::error::RegistryError;

/// The kinds of backend a [`Container`](crate::Container) keeps handles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Cache,
    Store,
    Producer,
    Consumer,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Cache => "cache",
            BackendKind::Store => "store",
            BackendKind::Producer => "producer",
            BackendKind::Consumer => "consumer",
        }
    }

    /// The not-found error for a `name` of this kind.
    pub fn not_found(self, name: &str) -> RegistryError {
        let name = name.to_string();
        match self {
            BackendKind::Cache => RegistryError::CacheNotFound(name),
            BackendKind::Store => RegistryError::StoreNotFound(name),
            BackendKind::Producer => RegistryError::ProducerNotFound(name),
            BackendKind::Consumer => RegistryError::ConsumerNotFound(name),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A handle type that can be stored in the [`Registry`](crate::Registry).
pub trait Backend: Send + Sync + 'static {
    const KIND: BackendKind;
}

impl Backend for RedisCache {
    const KIND: BackendKind = BackendKind::Cache;
}

impl Backend for Store {
    const KIND: BackendKind = BackendKind::Store;
}

impl Backend for KafkaPublisher {
    const KIND: BackendKind = BackendKind::Producer;
}

impl Backend for KafkaSubscriber {
    const KIND: BackendKind = BackendKind::Consumer;
}
