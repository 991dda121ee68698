//! Merit-order clearing for a single trading period.
//!
//! This crate handles:
//! - Bid stack building (stable price sort + cumulative volume)
//! - Marginal clearing price resolution for a demand level
//! - Per-period offer indexing
//! - Step-curve export of a stack

pub mod stack;
pub mod engine;
pub mod book;

pub use stack::{build_stack, BidStack, CurvePoint, StackRow};
pub use engine::{clear, clear_detailed, ClearingPoint};
pub use book::{clearing_price, OfferBook};
