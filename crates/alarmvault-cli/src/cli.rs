use clap::{Parser, Subcommand};

/// CLI surface definition. Diagnostics only; the scheduler drives the library directly.
#[derive(Parser, Debug)]
#[command(
    name = "alarmvault",
    about = "Session key custody and alarm persistence for desktop push alarms",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to a health check when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Provision or load the device secret and round-trip a throwaway key.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect stored session keys.
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Inspect persisted alarms.
    #[command(subcommand)]
    Alarms(AlarmsCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeysCommand {
    /// List push identifiers that have a stored session key.
    List,
    /// Forget the session key stored for a push identifier.
    Remove { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AlarmsCommand {
    /// List alarms persisted for rescheduling.
    List,
    /// Drop every persisted alarm.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_health_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["alarmvault"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["alarmvault", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["alarmvault", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn parses_keys_remove_with_id() {
        let cli = Cli::try_parse_from(["alarmvault", "keys", "remove", "pid1"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Keys(KeysCommand::Remove { id: "pid1".into() }))
        );
    }

    #[test]
    fn parses_alarms_list_subcommand() {
        let cli =
            Cli::try_parse_from(["alarmvault", "alarms", "list"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Alarms(AlarmsCommand::List)));
    }
}
