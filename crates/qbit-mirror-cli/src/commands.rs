use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "qbit-mirror")]
#[command(
    about = "Mirror seeding torrents from one qBittorrent instance to another",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (defaults to $QBIT_MIRROR_CONFIG, then /etc/qbit-mirror/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Reconcile only this info-hash instead of running a full pass
    #[arg(value_name = "HASH")]
    pub hash: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print state store statistics
    Stats,
    /// List blacklisted items
    Blacklist,
    /// Print configuration values (passwords redacted)
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hash_argument_selects_single_mode() {
        let cli = Cli::parse_from(["qbit-mirror", "--config", "/tmp/c.toml", "abcdef"]);
        assert_eq!(cli.hash.as_deref(), Some("abcdef"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_config_flag_precedes_subcommand() {
        let cli = Cli::parse_from(["qbit-mirror", "--config", "/tmp/c.toml", "stats"]);
        assert!(matches!(cli.command, Some(Commands::Stats)));
        assert!(cli.hash.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_subcommand_parses() {
        let cli = Cli::parse_from(["qbit-mirror", "print-config"]);
        assert!(matches!(cli.command, Some(Commands::PrintConfig)));
        assert!(cli.hash.is_none());
    }
}
