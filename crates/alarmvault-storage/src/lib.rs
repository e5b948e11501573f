//! Concrete storage pieces for session key custody.
//! The device secret lives in the OS keyring (or a test double) and wraps
//! session keys with AES-256 before they reach the JSON config store.

pub mod cipher;
pub mod json_config_store;
pub mod key_provider;
