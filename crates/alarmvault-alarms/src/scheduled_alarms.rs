use std::{collections::HashMap, sync::Arc};

use alarmvault_core::{
    alarms::{AlarmNotification, ScheduledAlarm},
    storage::{ConfigStore, ConfigStoreError},
};
use thiserror::Error;
use tracing::instrument;

/// Config store key holding the persisted alarm list.
pub const SCHEDULED_ALARMS_KEY: &str = "scheduledAlarms";

#[derive(Debug, Error)]
pub enum AlarmStoreError {
    #[error("config store error: {0}")]
    Store(#[from] ConfigStoreError),
    #[error("alarm list is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlarmStoreError>;

/// Keeps the set of scheduled alarms across restarts. Alarms are stored as
/// plain JSON; nothing here depends on the device secret.
pub struct ScheduledAlarmStore<C: ConfigStore> {
    config: Arc<C>,
}

impl<C: ConfigStore> ScheduledAlarmStore<C> {
    pub fn new(config: Arc<C>) -> Self {
        Self { config }
    }

    /// Replace the persisted list with the notifications currently scheduled.
    /// Live timer handles are dropped from the snapshot.
    #[instrument(skip_all, fields(count = scheduled.len()))]
    pub async fn save_scheduled_alarms<H>(
        &self,
        scheduled: &HashMap<String, ScheduledAlarm<H>>,
    ) -> Result<()> {
        let alarms: Vec<&AlarmNotification> = scheduled.values().map(|entry| &entry.an).collect();
        self.store(serde_json::to_value(alarms)?).await
    }

    #[instrument(skip(self))]
    pub async fn load_scheduled_alarms(&self) -> Result<Vec<AlarmNotification>> {
        match self.config.get(SCHEDULED_ALARMS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn clear_scheduled_alarms(&self) -> Result<()> {
        self.store(serde_json::Value::Array(Vec::new())).await
    }

    async fn store(&self, value: serde_json::Value) -> Result<()> {
        Ok(self.config.set(SCHEDULED_ALARMS_KEY, value).await?)
    }
}
