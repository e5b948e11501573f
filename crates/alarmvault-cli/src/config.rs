use std::{
    fs,
    path::{Path, PathBuf},
};

use alarmvault_storage::cipher::CipherSuite;
use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE: &str = "alarmvault";
pub const DEFAULT_ACCOUNT: &str = "device-secret";

/// User-level configuration loaded from `~/.config/alarmvault/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the directory holding the JSON config store.
    pub data_dir: Option<PathBuf>,
    /// Keychain entry holding the device secret.
    pub secret_store: Option<SecretStoreConfig>,
    /// Cipher used to wrap session keys; `aes-256-cbc` when unset.
    pub cipher: Option<CipherSuite>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SecretStoreConfig {
    pub service: Option<String>,
    pub account: Option<String>,
}

impl Config {
    pub fn service(&self) -> &str {
        self.secret_store
            .as_ref()
            .and_then(|s| s.service.as_deref())
            .unwrap_or(DEFAULT_SERVICE)
    }

    pub fn account(&self) -> &str {
        self.secret_store
            .as_ref()
            .and_then(|s| s.account.as_deref())
            .unwrap_or(DEFAULT_ACCOUNT)
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher.unwrap_or_default()
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("alarmvault").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.service(), DEFAULT_SERVICE);
        assert_eq!(cfg.account(), DEFAULT_ACCOUNT);
        assert_eq!(cfg.cipher_suite(), CipherSuite::Aes256Cbc);
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/alarmvault-data"
            cipher = "aes-256-gcm"
            [secret_store]
            service = "mail-desktop"
            account = "push-vault"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/alarmvault-data")),
                secret_store: Some(SecretStoreConfig {
                    service: Some("mail-desktop".into()),
                    account: Some("push-vault".into()),
                }),
                cipher: Some(CipherSuite::Aes256Gcm),
            }
        );
        assert_eq!(cfg.service(), "mail-desktop");
        assert_eq!(cfg.account(), "push-vault");
    }

    #[test]
    fn partial_secret_store_section_falls_back_per_field() {
        let cfg: Config = toml::from_str(
            r#"
            [secret_store]
            account = "only-account"
        "#,
        )
        .expect("parse");
        assert_eq!(cfg.service(), DEFAULT_SERVICE);
        assert_eq!(cfg.account(), "only-account");
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/alarmvault-data")),
            secret_store: None,
            cipher: Some(CipherSuite::Aes256Cbc),
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let second = write_to_path_if_missing(&cfg, &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded: Config =
            toml::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded, cfg);
    }
}
