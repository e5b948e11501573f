use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by platform secret store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    /// The backing vault rejected or failed the operation.
    #[error("secret store failure: {reason}")]
    Backend { reason: String },
}

/// Narrow view of the platform secret store (keychain / credential vault).
/// A single slot is addressed by service and account name.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the secret, `None` if no entry exists.
    async fn find_password(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<String>, SecretStoreError>;

    /// Create or replace the secret.
    async fn set_password(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError>;
}

/// In-memory secret store for tests and ephemeral sessions. Clones share the
/// same slots, which lets tests simulate a process restart.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    inner: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries; lets tests assert how many secrets exist.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn find_password(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<String>, SecretStoreError> {
        let map = self.inner.lock().map_err(|err| SecretStoreError::Backend {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    async fn set_password(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        let mut map = self.inner.lock().map_err(|err| SecretStoreError::Backend {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(
            (service.to_string(), account.to_string()),
            secret.to_string(),
        );
        Ok(())
    }
}
