//! Error types for the merit-order clearing system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the merit-order clearing system.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input (demand, period, date), rejected at the boundary.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bid data for a period is empty or contains invalid rows.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Demand is greater than the total capacity offered in the period.
    #[error("Demand {demand} exceeds maximum capacity {max_volume}")]
    DemandExceedsCapacity { demand: f64, max_volume: f64 },

    /// No stack row reaches a demand that is within capacity.
    ///
    /// The cumulative volume invariant makes this unreachable for a
    /// correctly built stack, so it always indicates a defect.
    #[error("No bids available to meet demand {demand} (max capacity {max_volume})")]
    NoClearingRow { demand: f64, max_volume: f64 },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source file could not be read or normalized.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Discriminant of [`Error`], used where callers branch on the failure
/// category (exit codes, batch failure tallies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DataIntegrity,
    DemandExceedsCapacity,
    NoClearingRow,
    Config,
    Ingestion,
    Database,
    Io,
    Json,
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a data integrity error.
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Error::DataIntegrity(msg.into())
    }

    /// Create a demand-exceeds-capacity error.
    pub fn demand_exceeds_capacity(demand: f64, max_volume: f64) -> Self {
        Error::DemandExceedsCapacity { demand, max_volume }
    }

    /// Create a no-clearing-row error.
    pub fn no_clearing_row(demand: f64, max_volume: f64) -> Self {
        Error::NoClearingRow { demand, max_volume }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an ingestion error.
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Error::Ingestion(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Get the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::DataIntegrity(_) => ErrorKind::DataIntegrity,
            Error::DemandExceedsCapacity { .. } => ErrorKind::DemandExceedsCapacity,
            Error::NoClearingRow { .. } => ErrorKind::NoClearingRow,
            Error::Config(_) => ErrorKind::Config,
            Error::Ingestion(_) => ErrorKind::Ingestion,
            Error::Database(_) => ErrorKind::Database,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }

    /// Whether this error signals a broken internal invariant rather than bad data.
    pub fn is_defect(&self) -> bool {
        self.kind() == ErrorKind::NoClearingRow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_carries_both_values() {
        let err = Error::demand_exceeds_capacity(501.0, 500.0);
        assert_eq!(err.to_string(), "Demand 501 exceeds maximum capacity 500");
        assert_eq!(err.kind(), ErrorKind::DemandExceedsCapacity);
    }

    #[test]
    fn test_only_missing_row_is_defect() {
        assert!(Error::no_clearing_row(10.0, 20.0).is_defect());
        assert!(!Error::data_integrity("empty").is_defect());
        assert!(!Error::validation("bad date").is_defect());
    }
}
