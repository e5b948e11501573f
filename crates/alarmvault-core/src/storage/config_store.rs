use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors produced by configuration store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigStoreError {
    /// Underlying storage failure.
    #[error("config storage failure: {reason}")]
    Storage { reason: String },
}

/// JSON key/value persistence. Synchronous backends are fine; the contract
/// is async so slower ones can be swapped in.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the value under `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError>;

    /// Persist `value` under `key`, overwriting any existing entry.
    async fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError>;
}

/// Config store kept in memory. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let map = self.inner.lock().map_err(|err| ConfigStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError> {
        let mut map = self.inner.lock().map_err(|err| ConfigStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(key.to_string(), value);
        Ok(())
    }
}
