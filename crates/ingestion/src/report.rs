//! Ingestion anomaly reporting.

use std::collections::BTreeMap;
use std::fmt;

use merit_core::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Category of a row-level problem found while loading a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Date could not be parsed; row dropped.
    InvalidDate,
    /// Date could not be parsed; previous valid date substituted.
    CarriedForwardDate,
    /// Period missing or outside 1-48.
    InvalidPeriod,
    /// Offer price missing or not a number.
    InvalidPrice,
    /// Offer volume missing, not a number or negative.
    InvalidVolume,
    /// Demand missing, not a number or negative.
    InvalidDemand,
    /// Optional numeric column blank or unparseable; kept as absent.
    MissingOptionalField,
    /// Offer row identical to an earlier one; dropped.
    DuplicateOffer,
    /// Second demand row for the same period; dropped.
    DuplicateDemand,
}

impl AnomalyKind {
    /// Whether the row was dropped because of this anomaly.
    pub fn drops_row(self) -> bool {
        !matches!(
            self,
            AnomalyKind::CarriedForwardDate | AnomalyKind::MissingOptionalField
        )
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnomalyKind::InvalidDate => "invalid date",
            AnomalyKind::CarriedForwardDate => "carried-forward date",
            AnomalyKind::InvalidPeriod => "invalid period",
            AnomalyKind::InvalidPrice => "invalid price",
            AnomalyKind::InvalidVolume => "invalid volume",
            AnomalyKind::InvalidDemand => "invalid demand",
            AnomalyKind::MissingOptionalField => "missing optional field",
            AnomalyKind::DuplicateOffer => "duplicate offer",
            AnomalyKind::DuplicateDemand => "duplicate demand",
        };
        f.write_str(label)
    }
}

/// A row-level problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    /// 1-based line number in the source file.
    pub line: u64,
    /// Category.
    pub kind: AnomalyKind,
    /// Human-readable detail.
    pub detail: String,
}

/// Summary of one source file load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    /// Source label (usually the file path).
    pub source: String,
    /// Data rows read (excluding preamble and header).
    pub rows_read: u64,
    /// Rows accepted into the output.
    pub rows_accepted: u64,
    /// Problems found, in file order.
    pub anomalies: Vec<Anomaly>,
}

impl IngestionReport {
    /// Create an empty report for a source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Record an anomaly and log it.
    pub fn record(&mut self, line: u64, kind: AnomalyKind, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(source = %self.source, line, %kind, "{detail}");
        self.anomalies.push(Anomaly { line, kind, detail });
    }

    /// Check if no anomalies were found.
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Number of rows dropped.
    pub fn rows_dropped(&self) -> u64 {
        self.rows_read.saturating_sub(self.rows_accepted)
    }

    /// Rows kept despite an anomaly (carried-forward dates, absent optional fields).
    pub fn rows_repaired(&self) -> usize {
        let mut lines: Vec<u64> = self
            .anomalies
            .iter()
            .filter(|a| !a.kind.drops_row())
            .map(|a| a.line)
            .collect();
        lines.dedup();
        lines.len()
    }

    /// Anomaly counts per kind.
    pub fn counts_by_kind(&self) -> BTreeMap<AnomalyKind, usize> {
        let mut counts = BTreeMap::new();
        for anomaly in &self.anomalies {
            *counts.entry(anomaly.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Log a one-line summary of the load.
    pub fn log_summary(&self) {
        info!(
            source = %self.source,
            rows_read = self.rows_read,
            rows_accepted = self.rows_accepted,
            rows_repaired = self.rows_repaired(),
            anomalies = self.anomalies.len(),
            "ingestion finished"
        );
    }

    /// In strict mode, turn any anomaly into a data integrity failure.
    pub fn enforce(&self, strict: bool) -> Result<()> {
        if !strict || self.is_clean() {
            return Ok(());
        }
        let summary: Vec<String> = self
            .counts_by_kind()
            .into_iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        Err(Error::data_integrity(format!(
            "{}: {} anomalies ({})",
            self.source,
            self.anomalies.len(),
            summary.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_dropped() {
        let mut report = IngestionReport::new("offers.csv");
        report.rows_read = 5;
        report.rows_accepted = 3;
        report.record(4, AnomalyKind::InvalidVolume, "volume -1 is negative");
        report.record(6, AnomalyKind::InvalidVolume, "volume abc is not a number");
        report.record(7, AnomalyKind::CarriedForwardDate, "40 Jan 2023");

        assert_eq!(report.rows_dropped(), 2);
        let counts = report.counts_by_kind();
        assert_eq!(counts[&AnomalyKind::InvalidVolume], 2);
        assert_eq!(counts[&AnomalyKind::CarriedForwardDate], 1);
        assert!(!AnomalyKind::CarriedForwardDate.drops_row());
        assert!(AnomalyKind::DuplicateOffer.drops_row());
        assert_eq!(report.rows_repaired(), 1);
    }

    #[test]
    fn test_repaired_counts_rows_once() {
        let mut report = IngestionReport::new("demand.csv");
        report.record(3, AnomalyKind::MissingOptionalField, "usep blank");
        report.record(3, AnomalyKind::MissingOptionalField, "tcl blank");
        report.record(4, AnomalyKind::InvalidDemand, "demand -1");
        report.record(5, AnomalyKind::MissingOptionalField, "lcp blank");
        assert_eq!(report.rows_repaired(), 2);
    }

    #[test]
    fn test_enforce() {
        let mut report = IngestionReport::new("demand.csv");
        assert!(report.enforce(true).is_ok());

        report.record(2, AnomalyKind::InvalidDemand, "demand -3 is negative");
        assert!(report.enforce(false).is_ok());
        let err = report.enforce(true).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        assert!(err.to_string().contains("1 invalid demand"));
    }
}
