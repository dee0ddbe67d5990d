//! Schema audit tool.
//!
//! Discovers the tables and columns of every configured target, tags them
//! through the configured metadata providers and accumulates the results in
//! a capture file per target.
//!
//! # Guarantees
//! - Read-only source access
//! - Connection strings are redacted in logs and capture files
//! - Capture files are replaced atomically

use clap::Parser;
use dbaudit_collect::{Cli, Command, commands};
use dbaudit_core::init_logging;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Audit(args) => {
            let report = commands::audit(args).await?;
            if !cli.global.quiet {
                print!("{}", report.render());
            }
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Status(args) => {
            print!("{}", commands::status(args).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Test(args) => {
            println!("{}", commands::test_connection(args).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Providers => {
            print!("{}", commands::providers());
            Ok(ExitCode::SUCCESS)
        }
        Command::SampleConfig => {
            print!("{}", commands::sample_config()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
