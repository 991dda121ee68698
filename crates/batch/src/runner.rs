//! Parallel in-memory batch clearing.
//!
//! Every demand row is an independent build-then-clear unit, so rows are
//! spread over a rayon pool with no coordination between them.

use merit_clearing::OfferBook;
use merit_core::config::BatchConfig;
use merit_core::{DemandRecord, Error, Result};
use rayon::prelude::*;
use tracing::info;

use crate::report::{BatchReport, ClearingOutcome};

/// Clears every row of a demand table against an offer book.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    /// Worker threads (0 = rayon default).
    workers: usize,
}

impl BatchRunner {
    /// Create a runner with a fixed worker count (0 = auto).
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Create a runner from the batch config.
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.workers)
    }

    /// Clear every demand row.
    pub fn run(&self, book: &OfferBook, demand: &[DemandRecord]) -> Result<BatchReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::config(format!("cannot start worker pool: {e}")))?;

        info!(
            periods = demand.len(),
            offer_periods = book.period_count(),
            workers = pool.current_num_threads(),
            "starting batch clearing"
        );

        let outcomes: Vec<ClearingOutcome> = pool.install(|| {
            demand
                .par_iter()
                .map(|record| ClearingOutcome {
                    key: record.key,
                    demand: record.demand,
                    result: book.clear(&record.key, record.demand),
                })
                .collect()
        });

        let report = BatchReport::from_outcomes(outcomes)?;
        info!(
            cleared = report.rows.len(),
            failed = report.failures.len(),
            "batch clearing finished"
        );
        Ok(report)
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(0)
    }
}
