//! Configuration structures for the merit-order clearing system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::DateRange;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source data locations.
    pub data: DataConfig,
    /// Caller-boundary validation.
    pub validation: ValidationConfig,
    /// Ingestion and normalization policy.
    pub ingestion: IngestionConfig,
    /// Batch run configuration.
    pub batch: BatchConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let range = &self.validation.date_range;
        DateRange::new(range.start, range.end)?;
        Ok(())
    }
}

/// Source data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Offer stack CSV.
    pub offer_stack_path: PathBuf,
    /// Demand (USEP) CSV.
    pub demand_path: PathBuf,
    /// Lines of preamble before the offer stack header.
    pub offer_preamble_rows: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            offer_stack_path: PathBuf::from("raw_data/DelayedOfferStacks_Energy.csv"),
            demand_path: PathBuf::from("raw_data/USEP.csv"),
            offer_preamble_rows: 2,
        }
    }
}

/// Caller-boundary validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Dates accepted from callers.
    pub date_range: DateRange,
}

/// What to do with a source row whose date cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidDatePolicy {
    /// Drop the row and report it.
    #[default]
    Reject,
    /// Reuse the last valid date seen in the file, and report it.
    CarryForward,
}

/// Ingestion and normalization policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Handling of unparseable dates.
    pub invalid_date_policy: InvalidDatePolicy,
    /// Drop offer rows identical to an earlier row.
    pub drop_duplicate_offers: bool,
    /// Fail the load if any anomaly was found.
    pub strict: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            invalid_date_policy: InvalidDatePolicy::Reject,
            drop_duplicate_offers: true,
            strict: false,
        }
    }
}

/// Batch run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of parallel workers (0 = auto).
    pub workers: usize,
    /// DuckDB database file (None = in-memory).
    pub database_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
