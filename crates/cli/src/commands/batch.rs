//! Clear every period of the demand table and write the report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use merit_batch::{BatchReport, BatchRunner, MeritStore};
use merit_core::Config;
use tracing::{info, warn};

use super::{load_book, load_demand, load_offers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Parallel in-process clearing
    Memory,
    /// Window-function clearing in DuckDB
    Duckdb,
}

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Report CSV path
    #[arg(short, long, default_value = "final_clearing_prices.csv")]
    pub output: PathBuf,

    /// Clearing engine
    #[arg(long, value_enum, default_value_t = Engine::Memory)]
    pub engine: Engine,
}

pub fn run(config: &Config, args: BatchArgs) -> Result<()> {
    let report = match args.engine {
        Engine::Memory => run_memory(config)?,
        Engine::Duckdb => run_duckdb(config)?,
    };

    for (kind, count) in report.failure_counts() {
        warn!(?kind, count, "periods not cleared");
    }

    report
        .write_csv_path(&args.output)
        .with_context(|| format!("writing report to {}", args.output.display()))?;
    info!(
        rows = report.rows.len(),
        failures = report.failures.len(),
        output = %args.output.display(),
        "wrote clearing report"
    );
    Ok(())
}

fn run_memory(config: &Config) -> Result<BatchReport> {
    let book = load_book(config)?;
    let demand = load_demand(config)?;
    Ok(BatchRunner::from_config(&config.batch).run(&book, &demand)?)
}

fn run_duckdb(config: &Config) -> Result<BatchReport> {
    let offers = load_offers(config)?;
    let demand = load_demand(config)?;

    let mut store = MeritStore::from_config(&config.batch)?;
    store.load_offers(&offers)?;
    store.load_demand(&demand)?;
    store.build_cumulative()?;
    let report = store.clear_all()?;
    store.close()?;
    Ok(report)
}
