//! # merit
//!
//! Command-line interface for the merit-order clearing engine.
//!
//! This CLI provides commands for:
//! - Clearing a single period at a given demand
//! - Inspecting a period's bid stack
//! - Clearing every period of the demand table
//! - Demand and price analysis

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use merit_core::config::LoggingConfig;
use merit_core::{Config, ErrorKind};
use tracing_subscriber::EnvFilter;

use commands::{analyze, batch, price, stack};

/// Merit-order clearing price engine
#[derive(Parser)]
#[command(name = "merit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clearing price for one date, period and demand
    Price(price::PriceArgs),

    /// Print the ordered bid stack of one period
    Stack(stack::StackArgs),

    /// Clear every period in the demand table
    Batch(batch::BatchArgs),

    /// Demand and price analysis
    Analyze(analyze::AnalyzeArgs),
}

fn setup_logging(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    setup_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Price(args) => price::run(&config, args),
        Commands::Stack(args) => stack::run(&config, args),
        Commands::Batch(args) => batch::run(&config, args),
        Commands::Analyze(args) => analyze::run(&config, args),
    }
}

/// Process exit status for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<merit_core::Error>())
        .map(merit_core::Error::kind);

    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::DataIntegrity) => 3,
        Some(ErrorKind::DemandExceedsCapacity) => 4,
        // internal defect
        Some(ErrorKind::NoClearingRow) => 70,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use merit_core::Error;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_price() {
        let cli = Cli::try_parse_from([
            "merit", "price", "--date", "2023-01-01", "--period", "2", "--demand", "150",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Price(_)));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_negative_demand_reaches_validation() {
        // parsed as a value so the domain validation reports it
        let cli = Cli::try_parse_from([
            "merit", "price", "--date", "2023-01-01", "--period", "2", "--demand", "-5",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_exit_codes() {
        let code = |e: Error| exit_code(&anyhow::Error::new(e));
        assert_eq!(code(Error::validation("bad date")), 2);
        assert_eq!(code(Error::data_integrity("no bids")), 3);
        assert_eq!(code(Error::demand_exceeds_capacity(2.0, 1.0)), 4);
        assert_eq!(code(Error::no_clearing_row(1.0, 2.0)), 70);
        assert_eq!(code(Error::database("locked")), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_exit_code_sees_through_context() {
        let err = anyhow::Error::new(Error::data_integrity("empty")).context("clearing 2023-01-01 period 1");
        assert_eq!(exit_code(&err), 3);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert_eq!(exit_code(&err), 1);
        assert!(load_config(None).is_ok());
    }
}
