mod cli;
mod config;
mod storage;

use std::sync::Arc;

use crate::cli::{AlarmsCommand, ConfigCommand, KeysCommand};
use crate::storage::Vault;
use alarmvault_alarms::SessionKeyResolver;
use alarmvault_core::{
    alarms::{IdTuple, NotificationSessionKey},
    storage::{ConfigStore, SecretStore},
};
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CHECK_ID: &str = "alarmvault-health-check";
// base64("health-check")
const CHECK_KEY: &str = "aGVhbHRoLWNoZWNr";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Health) {
        cli::Command::Version => print_version(),
        cli::Command::Health => {
            let vault = storage::vault_from_config(&config)?;
            run_health(&vault).await?;
            println!("Device secret: ok");
            println!("Session key store: ok ({:?})", vault.cipher);
        }
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Keys(cmd) => {
            let vault = storage::vault_from_config(&config)?;
            handle_keys(cmd, &vault).await?
        }
        cli::Command::Alarms(cmd) => {
            let vault = storage::vault_from_config(&config)?;
            handle_alarms(cmd, &vault).await?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("alarmvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

/// Loads (or provisions) the device secret, then stores a throwaway key and
/// resolves it through a cold resolver so the decrypt path is exercised.
async fn run_health<C: ConfigStore, S: SecretStore>(vault: &Vault<C, S>) -> Result<()> {
    vault.secrets.initialize().await?;
    vault
        .session_keys
        .store_session_key(CHECK_ID, CHECK_KEY)
        .await?;

    let cold = SessionKeyResolver::new(
        Arc::clone(&vault.config_store),
        Arc::clone(&vault.secrets),
        vault.cipher.build(),
    );
    let candidate = NotificationSessionKey::new("", IdTuple::new("health", CHECK_ID));
    let outcome = cold.resolve_session_key(vec![candidate]).await;
    vault.session_keys.remove_session_key(CHECK_ID).await?;

    if outcome?.key.session_key != CHECK_KEY {
        color_eyre::eyre::bail!("session key round-trip returned a different key");
    }
    vault
        .alarms
        .load_scheduled_alarms()
        .await
        .wrap_err("loading scheduled alarms")?;
    info!("health check passed");
    Ok(())
}

async fn handle_keys<C: ConfigStore, S: SecretStore>(
    cmd: KeysCommand,
    vault: &Vault<C, S>,
) -> Result<()> {
    match cmd {
        KeysCommand::List => {
            let ids = vault.session_keys.stored_identifiers().await?;
            if ids.is_empty() {
                println!("No session keys stored.");
                return Ok(());
            }
            for id in ids {
                println!("{id}");
            }
        }
        KeysCommand::Remove { id } => {
            vault.session_keys.remove_session_key(&id).await?;
            println!("Removed session key for {id}");
        }
    }
    Ok(())
}

async fn handle_alarms<C: ConfigStore, S: SecretStore>(
    cmd: AlarmsCommand,
    vault: &Vault<C, S>,
) -> Result<()> {
    match cmd {
        AlarmsCommand::List => {
            let alarms = vault.alarms.load_scheduled_alarms().await?;
            if alarms.is_empty() {
                println!("No scheduled alarms.");
                return Ok(());
            }
            for an in alarms {
                println!(
                    "{} [{}] {} ({})",
                    an.alarm_info.alarm_identifier,
                    an.alarm_info.trigger,
                    an.summary,
                    an.event_start.to_rfc3339()
                );
            }
        }
        AlarmsCommand::Clear => {
            vault.alarms.clear_scheduled_alarms().await?;
            println!("Cleared scheduled alarms.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn health_check_with_test_vault_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = storage::test_vault(dir.path(), &Config::default());
        run_health(&vault)
            .await
            .expect("health check should succeed");

        assert!(vault
            .session_keys
            .stored_identifiers()
            .await
            .expect("ids")
            .is_empty());
    }

    #[tokio::test]
    async fn health_check_with_gcm_suite_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            cipher: Some(alarmvault_storage::cipher::CipherSuite::Aes256Gcm),
            ..Config::default()
        };
        let vault = storage::test_vault(dir.path(), &config);
        run_health(&vault)
            .await
            .expect("health check should succeed");
    }

    #[tokio::test]
    async fn removing_keys_through_the_cli_handler() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = storage::test_vault(dir.path(), &Config::default());
        vault
            .session_keys
            .store_session_key("pid1", "a2V5MQ==")
            .await
            .expect("store");

        handle_keys(KeysCommand::Remove { id: "pid1".into() }, &vault)
            .await
            .expect("remove");
        assert!(vault
            .session_keys
            .stored_identifiers()
            .await
            .expect("ids")
            .is_empty());
    }

    #[tokio::test]
    async fn health_check_reports_the_alarm_store_cause() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = storage::test_vault(dir.path(), &Config::default());
        vault
            .config_store
            .set(
                alarmvault_alarms::scheduled_alarms::SCHEDULED_ALARMS_KEY,
                serde_json::json!("not a list"),
            )
            .await
            .expect("seed");

        let report = run_health(&vault).await.expect_err("health should fail");
        assert_eq!(report.to_string(), "loading scheduled alarms");
        let cause = report
            .downcast_ref::<alarmvault_alarms::AlarmStoreError>()
            .expect("typed cause kept");
        assert!(matches!(cause, alarmvault_alarms::AlarmStoreError::Corrupt(_)));
    }
}
