use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use alarmvault_alarms::{ScheduledAlarmStore, SessionKeyResolver};
use alarmvault_core::storage::{ConfigStore, SecretStore};
use alarmvault_storage::{
    cipher::CipherSuite,
    json_config_store::JsonFileConfigStore,
    key_provider::{DeviceSecretProvider, KeyringSecretStore},
};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

const STORE_FILE: &str = "config-store.json";

/// Everything the alarm scheduler needs, wired against one pair of stores.
pub struct Vault<C: ConfigStore, S: SecretStore> {
    pub config_store: Arc<C>,
    pub cipher: CipherSuite,
    pub secrets: Arc<DeviceSecretProvider<S>>,
    pub session_keys: SessionKeyResolver<C, S>,
    pub alarms: ScheduledAlarmStore<C>,
}

impl<C: ConfigStore, S: SecretStore> Vault<C, S> {
    pub fn new(config_store: C, secret_store: S, config: &Config) -> Self {
        let config_store = Arc::new(config_store);
        let secrets = Arc::new(DeviceSecretProvider::new(
            secret_store,
            config.service(),
            config.account(),
        ));
        let session_keys = SessionKeyResolver::new(
            Arc::clone(&config_store),
            Arc::clone(&secrets),
            config.cipher_suite().build(),
        );
        Self {
            alarms: ScheduledAlarmStore::new(Arc::clone(&config_store)),
            config_store,
            cipher: config.cipher_suite(),
            secrets,
            session_keys,
        }
    }
}

/// Resolve the default data directory for alarmvault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("alarmvault"))
}

/// Build the production vault: OS keychain plus a JSON file in the data dir.
pub fn vault_from_config(config: &Config) -> Result<Vault<JsonFileConfigStore, KeyringSecretStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let path = root.join(STORE_FILE);
    debug!(?path, service = config.service(), "initializing vault");
    Ok(Vault::new(
        JsonFileConfigStore::new(path),
        KeyringSecretStore,
        config,
    ))
}

/// Helper for tests: file-backed config store under `root`, in-memory keychain.
#[cfg(test)]
pub fn test_vault(
    root: impl Into<PathBuf>,
    config: &Config,
) -> Vault<JsonFileConfigStore, alarmvault_core::storage::InMemorySecretStore> {
    Vault::new(
        JsonFileConfigStore::new(root.into().join(STORE_FILE)),
        alarmvault_core::storage::InMemorySecretStore::new(),
        config,
    )
}
