use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alarmvault_core::{
    alarms::{NotificationSessionKey, ResolvedSessionKey},
    storage::{ConfigStore, ConfigStoreError, SecretStore},
};
use alarmvault_storage::{
    cipher::{CipherError, EncryptedKey, KeyCipher},
    key_provider::{DeviceSecretProvider, ProvisioningError},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Config store key holding `PushIdentifierId -> EncryptedKey`.
pub const SESSION_KEYS_KEY: &str = "pushEncSessionKeys";

#[derive(Debug, Error)]
pub enum SessionKeyError {
    #[error("device secret unavailable: {0}")]
    Provisioning(#[from] ProvisioningError),
    /// Every candidate was pruned.
    #[error("no candidate session key could be resolved")]
    Unresolvable,
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
    #[error("failed to wrap session key: {0}")]
    Encrypt(#[from] CipherError),
    /// The stored key map itself is not a JSON object.
    #[error("stored session keys are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A resolved key plus the candidates still worth offering next time:
/// the input with unresolvable entries removed, order preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub key: ResolvedSessionKey,
    pub remaining: Vec<NotificationSessionKey>,
}

/// In-memory cache of decrypted session keys in front of the encrypted
/// copies kept in the config store.
pub struct SessionKeyResolver<C: ConfigStore, S: SecretStore> {
    config: Arc<C>,
    secrets: Arc<DeviceSecretProvider<S>>,
    cipher: Box<dyn KeyCipher>,
    cache: Mutex<HashMap<String, String>>,
    // Held for every read-modify-write of SESSION_KEYS_KEY.
    write_lock: tokio::sync::Mutex<()>,
}

impl<C: ConfigStore, S: SecretStore> SessionKeyResolver<C, S> {
    pub fn new(
        config: Arc<C>,
        secrets: Arc<DeviceSecretProvider<S>>,
        cipher: Box<dyn KeyCipher>,
    ) -> Self {
        Self {
            config,
            secrets,
            cipher,
            cache: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Persist a session key for `id` unless one is already stored.
    /// An existing readable entry is never replaced; an entry that no longer
    /// parses as an [`EncryptedKey`] is overwritten. Other entries are kept
    /// as they are, readable or not.
    #[instrument(skip(self, plain_key_b64))]
    pub async fn store_session_key(
        &self,
        id: &str,
        plain_key_b64: &str,
    ) -> Result<(), SessionKeyError> {
        let _write = self.write_lock.lock().await;
        let mut keys = self.load_keys().await?;
        match keys.get(id).map(parse_entry) {
            Some(Ok(_)) => {
                debug!("session key already stored");
                return Ok(());
            }
            Some(Err(err)) => warn!(error = %err, "replacing unreadable stored session key"),
            None => {}
        }

        // Visible to resolvers before the encrypted copy lands.
        self.cache()
            .insert(id.to_string(), plain_key_b64.to_string());

        let persisted = self.wrap_and_persist(id, plain_key_b64, &mut keys).await;
        if persisted.is_err() {
            // The caller sees a failed store, so the key must not resolve either.
            self.cache().remove(id);
        }
        persisted
    }

    /// Find the first candidate whose session key can be recovered.
    ///
    /// Candidates without a stored key, or whose stored key does not decrypt,
    /// are dropped from [`Resolution::remaining`]. Candidates after the match
    /// are kept untouched. When nothing resolves every candidate was dropped
    /// and [`SessionKeyError::Unresolvable`] is returned.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn resolve_session_key(
        &self,
        candidates: Vec<NotificationSessionKey>,
    ) -> Result<Resolution, SessionKeyError> {
        let secret = self.secrets.secret().await?;
        let mut stored: Option<BTreeMap<String, Value>> = None;

        let mut candidates = candidates.into_iter();
        while let Some(candidate) = candidates.next() {
            let id = candidate.push_identifier_id().to_string();

            let cached = self.cache().get(&id).cloned();
            if let Some(session_key) = cached {
                return Ok(resolved(session_key, candidate, candidates));
            }

            if stored.is_none() {
                stored = Some(self.load_keys().await?);
            }
            let Some(entry) = stored.as_ref().and_then(|keys| keys.get(&id)) else {
                debug!(push_identifier = %id, "no stored session key, dropping candidate");
                continue;
            };
            let encrypted = match parse_entry(entry) {
                Ok(encrypted) => encrypted,
                Err(err) => {
                    warn!(
                        push_identifier = %id,
                        error = %err,
                        "stored session key is unreadable, dropping candidate"
                    );
                    continue;
                }
            };

            match self.cipher.decrypt(&encrypted, secret) {
                Ok(session_key) => {
                    self.cache().insert(id, session_key.clone());
                    return Ok(resolved(session_key, candidate, candidates));
                }
                Err(err) => {
                    warn!(
                        push_identifier = %id,
                        error = %err,
                        "stored session key is unrecoverable, dropping candidate"
                    );
                }
            }
        }

        Err(SessionKeyError::Unresolvable)
    }

    /// Forget the key for a push identifier that was deregistered.
    #[instrument(skip(self))]
    pub async fn remove_session_key(&self, id: &str) -> Result<(), SessionKeyError> {
        let _write = self.write_lock.lock().await;
        self.cache().remove(id);
        let mut keys = self.load_keys().await?;
        if keys.remove(id).is_some() {
            self.save_keys(&keys).await?;
        }
        Ok(())
    }

    /// Push identifier ids with a stored key, sorted. Never exposes key material.
    pub async fn stored_identifiers(&self) -> Result<Vec<String>, SessionKeyError> {
        Ok(self.load_keys().await?.into_keys().collect())
    }

    async fn wrap_and_persist(
        &self,
        id: &str,
        plain_key_b64: &str,
        keys: &mut BTreeMap<String, Value>,
    ) -> Result<(), SessionKeyError> {
        let secret = self.secrets.secret().await?;
        let encrypted = self.cipher.encrypt(plain_key_b64, secret)?;
        keys.insert(id.to_string(), serde_json::to_value(encrypted)?);
        self.save_keys(keys).await
    }

    // Entries stay raw JSON so one malformed entry only affects its own id.
    async fn load_keys(&self) -> Result<BTreeMap<String, Value>, SessionKeyError> {
        match self.config.get(SESSION_KEYS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn save_keys(&self, keys: &BTreeMap<String, Value>) -> Result<(), SessionKeyError> {
        let value = serde_json::to_value(keys)?;
        self.config.set(SESSION_KEYS_KEY, value).await?;
        Ok(())
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // Entries are plain inserts; a panic elsewhere cannot leave the map torn.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_entry(entry: &Value) -> Result<EncryptedKey, serde_json::Error> {
    EncryptedKey::deserialize(entry)
}

// Everything before `candidate` was dropped, so the remainder starts at it.
fn resolved(
    session_key: String,
    candidate: NotificationSessionKey,
    rest: impl Iterator<Item = NotificationSessionKey>,
) -> Resolution {
    let key = ResolvedSessionKey {
        session_key,
        peer_enc_session_key: candidate.push_identifier_session_enc_session_key.clone(),
    };
    let remaining = std::iter::once(candidate).chain(rest).collect();
    Resolution { key, remaining }
}
