#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use container::{Backend, BackendKind};
use health::{HealthCheck, ProbeError};

/// Stand-in for a backend client whose health can be flipped at will.
pub struct FakeBackend<const K: u8> {
    pub id: u32,
    healthy: AtomicBool,
}

impl<const K: u8> FakeBackend<K> {
    pub fn new(id: u32, healthy: bool) -> Self {
        Self {
            id,
            healthy: AtomicBool::new(healthy),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl<const K: u8> HealthCheck for FakeBackend<K> {
    async fn check(&self) -> Result<(), ProbeError> {
        match self.healthy.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(ProbeError::new(format!("backend {} unavailable", self.id))),
        }
    }
}

pub type FakeCache = FakeBackend<0>;
pub type FakeStore = FakeBackend<1>;
pub type FakeProducer = FakeBackend<2>;
pub type FakeConsumer = FakeBackend<3>;

impl Backend for FakeCache {
    const KIND: BackendKind = BackendKind::Cache;
}

impl Backend for FakeStore {
    const KIND: BackendKind = BackendKind::Store;
}

impl Backend for FakeProducer {
    const KIND: BackendKind = BackendKind::Producer;
}

impl Backend for FakeConsumer {
    const KIND: BackendKind = BackendKind::Consumer;
}
