//! Bid stack building.
//!
//! Orders a period's bids by ascending price and annotates each row with the
//! running total of offered volume.

use merit_core::{Bid, Error, Price, Result, Volume};
use serde::Serialize;

/// One bid in merit order, with its cumulative volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StackRow {
    /// Offer price.
    pub price: Price,
    /// Volume offered by this bid.
    pub volume: Volume,
    /// Sum of volume over this row and every cheaper row.
    pub cumulative_volume: Volume,
    /// Position of the bid in the input sequence.
    pub input_index: usize,
}

/// A point of the post-step supply curve: from `cumulative_volume` onwards
/// (until the next point) the curve sits at the next row's price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub cumulative_volume: Volume,
    pub price: Price,
}

/// Clearing-ready stack for one trading period. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct BidStack {
    rows: Vec<StackRow>,
    max_volume: Volume,
}

/// Build the merit-order stack for one period.
///
/// Bids are stable-sorted by ascending price, so equal prices keep their
/// input order. Cumulative volume is summed in sorted order.
///
/// Fails with [`Error::DataIntegrity`] if `bids` is empty or any bid has a
/// non-finite price or a negative or non-finite volume.
pub fn build_stack(bids: &[Bid]) -> Result<BidStack> {
    if bids.is_empty() {
        return Err(Error::data_integrity("bid collection is empty"));
    }

    for (index, bid) in bids.iter().enumerate() {
        bid.check()
            .map_err(|reason| Error::data_integrity(format!("bid #{index} is invalid: {reason}")))?;
    }

    let mut ordered: Vec<(usize, &Bid)> = bids.iter().enumerate().collect();
    ordered.sort_by_key(|(_, bid)| bid.price_key());

    let mut cumulative = 0.0;
    let rows: Vec<StackRow> = ordered
        .into_iter()
        .map(|(input_index, bid)| {
            cumulative += bid.volume;
            StackRow {
                price: bid.price,
                volume: bid.volume,
                cumulative_volume: cumulative,
                input_index,
            }
        })
        .collect();

    Ok(BidStack {
        rows,
        max_volume: cumulative,
    })
}

impl BidStack {
    /// Assemble a stack without checking its invariants.
    #[cfg(test)]
    pub(crate) fn from_parts(rows: Vec<StackRow>, max_volume: Volume) -> Self {
        Self { rows, max_volume }
    }

    /// Rows in merit order.
    pub fn rows(&self) -> &[StackRow] {
        &self.rows
    }

    /// Total capacity offered in the period (the last cumulative volume).
    #[inline]
    pub fn max_volume(&self) -> Volume {
        self.max_volume
    }

    /// Number of bids in the stack.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false for a built stack; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cheapest bid.
    pub fn cheapest(&self) -> &StackRow {
        // build_stack rejects empty input
        &self.rows[0]
    }

    /// Most expensive bid.
    pub fn most_expensive(&self) -> &StackRow {
        &self.rows[self.rows.len() - 1]
    }

    /// Points of the cumulative-volume vs. price step curve, one per row.
    pub fn step_curve(&self) -> Vec<CurvePoint> {
        self.rows
            .iter()
            .map(|row| CurvePoint {
                cumulative_volume: row.cumulative_volume,
                price: row.price,
            })
            .collect()
    }
}
