//! Library module for dbaudit-collect
//!
//! Holds the command-line definition and the command implementations so
//! they can be exercised from tests; `main.rs` only parses, sets up logging
//! and maps the outcome to an exit status.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Target name selecting every configured target.
pub const ALL_TARGETS: &str = "All";

#[derive(Debug, Parser)]
#[command(name = "dbaudit-collect")]
#[command(about = "Schema discovery and metadata audit tool")]
#[command(version)]
#[command(long_about = "
dbaudit - schema discovery with stable identifiers and pluggable metadata

Every configured target is opened read-only, its tables and columns are
enumerated, each object gets a stable identifier (database::table or
database::table::column::type), and the configured metadata providers tag
it. Results accumulate across runs in one capture file per target.

SUPPORTED SOURCES:
- SQLite (file path or sqlite:// URL)
- PostgreSQL (postgres://)
- MySQL (mysql://) [if compiled with --features mysql]
- CSV files

EXAMPLES:
  dbaudit-collect sample-config > audit.yaml
  dbaudit-collect audit --config audit.yaml
  dbaudit-collect audit --config audit.yaml --target shop --comment \"after migration\"
  dbaudit-collect status --config audit.yaml --target shop
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Audit one or all configured targets
    Audit(AuditArgs),
    /// Print a target's tables and columns without running providers
    Status(TargetArgs),
    /// Test the connection to a target
    Test(TargetArgs),
    /// List registered metadata providers
    Providers,
    /// Print a sample YAML configuration
    SampleConfig,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Audit configuration file
    #[arg(short, long, env = "DBAUDIT_CONFIG", value_name = "FILE")]
    pub config: PathBuf,

    /// Target to audit, or "All"
    #[arg(short, long, default_value = ALL_TARGETS)]
    pub target: String,

    /// Comment recorded in the capture event
    #[arg(long)]
    pub comment: Option<String>,

    /// Discover without writing the capture file
    #[arg(long)]
    pub no_update: bool,

    /// Replace a capture file that cannot be parsed instead of failing
    #[arg(long)]
    pub overwrite_corrupt: bool,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Audit configuration file
    #[arg(short, long, env = "DBAUDIT_CONFIG", value_name = "FILE")]
    pub config: PathBuf,

    /// Target name
    #[arg(short, long)]
    pub target: String,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(
        short,
        long,
        global = true,
        help = "Suppress all output except errors"
    )]
    pub quiet: bool,
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
    fn test_parse_audit_defaults() {
        let cli = Cli::try_parse_from(["dbaudit-collect", "audit", "--config", "audit.yaml"]).unwrap();
        match cli.command {
            Command::Audit(args) => {
                assert_eq!(args.target, ALL_TARGETS);
                assert!(!args.no_update);
                assert!(!args.overwrite_corrupt);
                assert!(args.comment.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dbaudit-collect",
            "status",
            "--config",
            "audit.yaml",
            "--target",
            "shop",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert!(!cli.global.quiet);
    }

    #[test]
    fn test_status_requires_target() {
        assert!(Cli::try_parse_from(["dbaudit-collect", "status", "--config", "a.yaml"]).is_err());
    }
}
