//! Per-period index of offers.

use std::collections::BTreeMap;

use merit_core::{Bid, Demand, Error, OfferRecord, PeriodKey, Price, Result};
use tracing::debug;

use crate::engine::{clear_detailed, ClearingPoint};
use crate::stack::{build_stack, BidStack};

/// Offers grouped by trading period, each group in input order.
#[derive(Debug, Clone, Default)]
pub struct OfferBook {
    periods: BTreeMap<PeriodKey, Vec<Bid>>,
}

impl OfferBook {
    /// Group normalized offer records by period.
    ///
    /// Records are ordered by their input ordinal before grouping, so the
    /// stack tie-break does not depend on the order records arrive in here.
    pub fn from_records(records: impl IntoIterator<Item = OfferRecord>) -> Self {
        let mut records: Vec<OfferRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.seq);

        let mut periods: BTreeMap<PeriodKey, Vec<Bid>> = BTreeMap::new();
        for record in records {
            periods.entry(record.key).or_default().push(record.bid);
        }
        Self { periods }
    }

    /// Bids for a period.
    pub fn bids(&self, key: &PeriodKey) -> Result<&[Bid]> {
        self.periods
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::data_integrity(format!("no bids found for {key}")))
    }

    /// Build the stack for a period.
    pub fn stack(&self, key: &PeriodKey) -> Result<BidStack> {
        let bids = self.bids(key)?;
        build_stack(bids).map_err(|e| match e {
            Error::DataIntegrity(msg) => Error::data_integrity(format!("{key}: {msg}")),
            other => other,
        })
    }

    /// Build the stack for a period and clear `demand` against it.
    pub fn clear(&self, key: &PeriodKey, demand: Demand) -> Result<ClearingPoint> {
        let stack = self.stack(key)?;
        debug!(
            %key,
            bids = stack.len(),
            max_volume = stack.max_volume(),
            demand = demand.value(),
            "clearing period"
        );
        clear_detailed(&stack, demand)
    }

    /// Periods with at least one bid, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &PeriodKey> {
        self.periods.keys()
    }

    /// Number of periods.
    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    /// Total number of bids across all periods.
    pub fn bid_count(&self) -> usize {
        self.periods.values().map(Vec::len).sum()
    }

    /// Check if the book holds no offers.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Clearing price of one period: build its stack, then clear `demand`.
pub fn clearing_price(book: &OfferBook, key: &PeriodKey, demand: Demand) -> Result<Price> {
    book.clear(key, demand).map(|point| point.price)
}
