//! Core types and configuration for the merit-order clearing system.
//!
//! This crate provides shared types used across all other crates:
//! - Bid, demand and settlement period types
//! - Boundary validation for caller input
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use types::*;
