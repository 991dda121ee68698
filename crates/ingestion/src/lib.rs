//! Data ingestion and normalization for the merit-order clearing system.
//!
//! This crate handles:
//! - Column name normalization for heterogeneous source headers
//! - Mixed-format date parsing with an explicit invalid-date policy
//! - Offer stack and demand table loading
//! - Anomaly reporting for dropped or repaired rows

pub mod columns;
pub mod dates;
pub mod report;
pub mod offers;
pub mod demand;

pub use dates::{parse_source_date, DateResolver};
pub use demand::{DemandLoader, LoadedDemand};
pub use offers::{LoadedOffers, OfferStackLoader};
pub use report::{Anomaly, AnomalyKind, IngestionReport};
