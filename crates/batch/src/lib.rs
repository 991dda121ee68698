//! Batch clearing for the merit-order clearing system.
//!
//! This crate provides:
//! - Parallel in-memory clearing of every period in a demand table
//! - The same computation against a DuckDB store
//! - The tabular clearing report
//! - Demand and price analysis over the demand table

pub mod report;
pub mod runner;
pub mod store;
pub mod analysis;

pub use report::{BatchReport, ClearingFailure, ClearingOutcome, ReportRow};
pub use runner::BatchRunner;
pub use store::MeritStore;
pub use analysis::DemandAnalysis;
