use lifecycle::LifecycleError;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use crate::backend::BackendKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cache not found for name {0}")]
    CacheNotFound(String),
    #[error("store not found for name {0}")]
    StoreNotFound(String),
    #[error("producer not found for name {0}")]
    ProducerNotFound(String),
    #[error("consumer not found for name {0}")]
    ConsumerNotFound(String),
}

impl RegistryError {
    pub fn kind(&self) -> BackendKind {
        match self {
            RegistryError::CacheNotFound(_) => BackendKind::Cache,
            RegistryError::StoreNotFound(_) => BackendKind::Store,
            RegistryError::ProducerNotFound(_) => BackendKind::Producer,
            RegistryError::ConsumerNotFound(_) => BackendKind::Consumer,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegistryError::CacheNotFound(name)
            | RegistryError::StoreNotFound(name)
            | RegistryError::ProducerNotFound(name)
            | RegistryError::ConsumerNotFound(name) => name,
        }
    }
}

/// Misconfiguration of a [`Container`](crate::Container).
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("a router is required before configuring the server")]
    MissingRouter,
    #[error("no server configured")]
    MissingServer,
    #[error("server already configured")]
    ServerAlreadyConfigured,
    #[error("TLS_CERT_FILE and TLS_KEY_FILE must be set together")]
    IncompleteTls,
    #[error("failed to load configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
