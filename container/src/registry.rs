use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::backend::{Backend, BackendKind};
use crate::error::RegistryError;

pub(crate) type Entries = HashMap<(BackendKind, String), Arc<dyn Any + Send + Sync>>;

/// Named backend handles, keyed by kind and name, behind a single lock.
///
/// The registry only holds shared references. Replacing an entry drops the
/// registry's reference to the previous handle and nothing else; whatever
/// cleanup the handle does on drop runs once its last user lets go of it.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Entries>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` under `name`, replacing any handle of the same kind
    /// already registered under that name.
    pub fn register<B: Backend>(&self, name: &str, handle: Arc<B>) {
        Self::insert(&mut self.lock(), name, handle);
    }

    /// Returns the handle registered under `name`.
    ///
    /// A handle of the same kind but of a different type counts as missing.
    pub fn lookup<B: Backend>(&self, name: &str) -> Result<Arc<B>, RegistryError> {
        let entry = self.lock().get(&(B::KIND, name.to_string())).cloned();
        match entry.map(|handle| handle.downcast::<B>()) {
            Some(Ok(handle)) => Ok(handle),
            Some(Err(_)) | None => {
                let kind = B::KIND;
                warn!(%kind, name, "backend not registered");
                Err(kind.not_found(name))
            }
        }
    }

    pub fn contains(&self, kind: BackendKind, name: &str) -> bool {
        self.lock().contains_key(&(kind, name.to_string()))
    }

    /// Registered names of `kind`, sorted.
    pub fn names(&self, kind: BackendKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert<B: Backend>(entries: &mut Entries, name: &str, handle: Arc<B>) {
        let kind = B::KIND;
        let handle: Arc<dyn Any + Send + Sync> = handle;
        if entries.insert((kind, name.to_string()), handle).is_some() {
            warn!(%kind, name, "backend replaced");
        } else {
            debug!(%kind, name, "backend registered");
        }
    }
}
