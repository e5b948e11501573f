//! Contracts for the two external stores: the platform secret store and the
//! JSON configuration store.

mod config_store;
mod secret_store;

pub use config_store::{ConfigStore, ConfigStoreError, InMemoryConfigStore};
pub use secret_store::{InMemorySecretStore, SecretStore, SecretStoreError};
