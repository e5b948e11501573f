//! Core abstractions for alarmvault: alarm records, session key candidates,
//! and the secret/config store contracts the rest of the workspace builds on.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod alarms;
pub mod storage;
