//! Session key custody and alarm persistence on top of the config store.

pub mod scheduled_alarms;
pub mod session_keys;

pub use scheduled_alarms::{AlarmStoreError, ScheduledAlarmStore};
pub use session_keys::{Resolution, SessionKeyError, SessionKeyResolver};
