//! Subcommand implementations.

pub mod analyze;
pub mod batch;
pub mod price;
pub mod stack;

use anyhow::{Context, Result};
use merit_clearing::OfferBook;
use merit_core::{parse_trading_date, Config, DemandRecord, OfferRecord, PeriodKey, SettlementPeriod};
use merit_ingestion::{DemandLoader, OfferStackLoader};
use tracing::info;

/// Validate a caller-supplied date and period.
pub fn period_key(config: &Config, date: &str, period: i64) -> merit_core::Result<PeriodKey> {
    let date = parse_trading_date(date, &config.validation.date_range)?;
    let period = SettlementPeriod::from_i64(period)?;
    Ok(PeriodKey::new(date, period))
}

/// Load and normalize the offer stack file.
pub fn load_offers(config: &Config) -> Result<Vec<OfferRecord>> {
    let path = &config.data.offer_stack_path;
    let loaded = OfferStackLoader::from_config(config)
        .load_path(path)
        .with_context(|| format!("loading offers from {}", path.display()))?;
    info!(
        offers = loaded.records.len(),
        dropped = loaded.report.rows_dropped(),
        "loaded offer stack"
    );
    Ok(loaded.records)
}

/// Load the offer stack and index it by period.
pub fn load_book(config: &Config) -> Result<OfferBook> {
    Ok(OfferBook::from_records(load_offers(config)?))
}

/// Load and normalize the demand table.
pub fn load_demand(config: &Config) -> Result<Vec<DemandRecord>> {
    let path = &config.data.demand_path;
    let loaded = DemandLoader::from_config(config)
        .load_path(path)
        .with_context(|| format!("loading demand from {}", path.display()))?;
    info!(
        periods = loaded.records.len(),
        dropped = loaded.report.rows_dropped(),
        "loaded demand table"
    );
    Ok(loaded.records)
}
