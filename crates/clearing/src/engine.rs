//! Clearing price resolution.
//!
//! The clearing price is the price of the marginal bid: the first row, in
//! merit order, whose cumulative volume reaches the demand.

use merit_core::{Demand, Error, Price, Result, Volume};
use serde::Serialize;

use crate::stack::BidStack;

/// The marginal row that clears a demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClearingPoint {
    /// Clearing (marginal) price.
    pub price: Price,
    /// Cumulative volume at the marginal row.
    pub cumulative_volume: Volume,
    /// Index of the marginal row in the stack.
    pub index: usize,
}

/// Find the marginal row for `demand`.
///
/// Demand above the stack's total capacity is rejected before any search.
/// Demand exactly at a cumulative breakpoint clears at that breakpoint's
/// price; demand between two breakpoints clears at the upper one. When
/// several rows share a cumulative volume (zero-volume bids) the first,
/// cheapest one wins.
pub fn clear_detailed(stack: &BidStack, demand: Demand) -> Result<ClearingPoint> {
    let demand = demand.value();
    let max_volume = stack.max_volume();

    if demand > max_volume {
        return Err(Error::demand_exceeds_capacity(demand, max_volume));
    }

    let rows = stack.rows();
    // cumulative_volume is non-decreasing, so this is the first row >= demand
    let index = rows.partition_point(|row| row.cumulative_volume < demand);

    let row = rows
        .get(index)
        .ok_or_else(|| Error::no_clearing_row(demand, max_volume))?;

    Ok(ClearingPoint {
        price: row.price,
        cumulative_volume: row.cumulative_volume,
        index,
    })
}

/// Clearing price for `demand`.
pub fn clear(stack: &BidStack, demand: Demand) -> Result<Price> {
    clear_detailed(stack, demand).map(|point| point.price)
}
