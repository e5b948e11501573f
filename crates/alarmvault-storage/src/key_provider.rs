use std::fmt;

use alarmvault_core::storage::{SecretStore, SecretStoreError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// Length of the device secret in bytes (AES-256 key).
pub const DEVICE_SECRET_LEN: usize = 32;

/// The one device-wide secret that wraps every stored session key.
/// Key bytes never leave this crate and are redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceSecret {
    bytes: [u8; DEVICE_SECRET_LEN],
}

impl DeviceSecret {
    /// Fresh random secret from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; DEVICE_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ProvisioningError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProvisioningError::Malformed(e.to_string()))?;
        if bytes.len() != DEVICE_SECRET_LEN {
            return Err(ProvisioningError::Malformed(format!(
                "expected {DEVICE_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut out = [0u8; DEVICE_SECRET_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self { bytes: out })
    }

    fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; DEVICE_SECRET_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret(<redacted>)")
    }
}

/// The device secret could not be created, read, or confirmed durable.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("secret store: {0}")]
    Store(#[from] SecretStoreError),
    #[error("device secret was written but reading it back returned nothing")]
    NotDurable,
    #[error("stored device secret is malformed: {0}")]
    Malformed(String),
}

/// Owns the device secret for the process lifetime.
///
/// All users await the same single-assignment cell, so callers that arrive
/// before provisioning has finished suspend until it completes, and
/// provisioning itself runs once. A failed attempt leaves the cell empty.
pub struct DeviceSecretProvider<S: SecretStore> {
    store: S,
    service: String,
    account: String,
    secret: OnceCell<DeviceSecret>,
}

impl<S: SecretStore> DeviceSecretProvider<S> {
    pub fn new(store: S, service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
            account: account.into(),
            secret: OnceCell::new(),
        }
    }

    /// Load the device secret, creating it on first run.
    #[instrument(skip_all, fields(service = %self.service))]
    pub async fn initialize(&self) -> Result<(), ProvisioningError> {
        self.secret().await.map(|_| ())
    }

    /// Wait for the device secret. Runs provisioning if nobody has yet.
    pub async fn secret(&self) -> Result<&DeviceSecret, ProvisioningError> {
        self.secret.get_or_try_init(|| self.provision()).await
    }

    pub fn is_initialized(&self) -> bool {
        self.secret.initialized()
    }

    async fn provision(&self) -> Result<DeviceSecret, ProvisioningError> {
        if let Some(existing) = self.find().await? {
            info!("loaded device secret");
            return DeviceSecret::from_base64(&existing);
        }

        warn!(
            service = %self.service,
            "no device secret found, provisioning a new one"
        );
        let fresh = DeviceSecret::generate();
        self.store
            .set_password(&self.service, &self.account, &fresh.to_base64())
            .await?;

        // Re-read so a vault that silently drops writes is caught here
        // rather than after session keys were wrapped with a lost secret.
        let stored = self.find().await?.ok_or(ProvisioningError::NotDurable)?;
        DeviceSecret::from_base64(&stored)
    }

    async fn find(&self) -> Result<Option<String>, ProvisioningError> {
        let found = self
            .store
            .find_password(&self.service, &self.account)
            .await?;
        Ok(found.filter(|secret| !secret.is_empty()))
    }
}

/// OS keyring-backed secret store. Uses the `keyring` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringSecretStore;

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn find_password(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<String>, SecretStoreError> {
        let (service, account) = (service.to_string(), account.to_string());
        // Keychain calls block (and may prompt); keep them off the runtime threads.
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(backend_err)?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(err) => Err(backend_err(err)),
            }
        })
        .await
        .map_err(backend_err)?
    }

    async fn set_password(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        let (service, account, secret) =
            (service.to_string(), account.to_string(), secret.to_string());
        tokio::task::spawn_blocking(move || {
            keyring::Entry::new(&service, &account)
                .and_then(|entry| entry.set_password(&secret))
                .map_err(backend_err)
        })
        .await
        .map_err(backend_err)?
    }
}

fn backend_err<E: ToString>(err: E) -> SecretStoreError {
    SecretStoreError::Backend {
        reason: err.to_string(),
    }
}
