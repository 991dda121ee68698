//! Batch clearing report.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use merit_clearing::ClearingPoint;
use merit_core::{Demand, Error, ErrorKind, PeriodKey, Price, Result, SettlementPeriod, Volume};
use serde::Serialize;
use tracing::{error, warn};

/// Result of clearing one demand row.
#[derive(Debug)]
pub struct ClearingOutcome {
    pub key: PeriodKey,
    pub demand: Demand,
    pub result: Result<ClearingPoint>,
}

/// One cleared period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub period: SettlementPeriod,
    pub demand: Volume,
    pub final_clearing_price: Price,
    pub cumulative_volume_at_clearing: Volume,
}

/// A period that could not be cleared.
#[derive(Debug, Clone, Serialize)]
pub struct ClearingFailure {
    pub key: PeriodKey,
    pub demand: Volume,
    pub kind: ErrorKind,
    pub message: String,
}

/// Report CSV columns, in [`ReportRow`] field order.
pub const REPORT_COLUMNS: [&str; 5] = [
    "date",
    "period",
    "demand",
    "final_clearing_price",
    "cumulative_volume_at_clearing",
];

/// Cleared rows and per-period failures, both in key order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub rows: Vec<ReportRow>,
    pub failures: Vec<ClearingFailure>,
}

impl BatchReport {
    /// Collect outcomes into a report.
    ///
    /// Data problems for a single period are recorded as failures. A
    /// [`Error::NoClearingRow`] means the engine's own invariant broke, so it
    /// aborts the whole report instead.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ClearingOutcome>) -> Result<Self> {
        let mut report = BatchReport::default();

        for outcome in outcomes {
            match outcome.result {
                Ok(point) => report.rows.push(ReportRow {
                    date: outcome.key.date,
                    period: outcome.key.period,
                    demand: outcome.demand.value(),
                    final_clearing_price: point.price,
                    cumulative_volume_at_clearing: point.cumulative_volume,
                }),
                Err(err) if err.is_defect() => {
                    error!(key = %outcome.key, "{err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!(key = %outcome.key, kind = ?err.kind(), "{err}");
                    report.failures.push(ClearingFailure {
                        key: outcome.key,
                        demand: outcome.demand.value(),
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        report.rows.sort_by_key(|r| (r.date, r.period));
        report.failures.sort_by_key(|f| f.key);
        Ok(report)
    }

    /// Failure counts per kind.
    pub fn failure_counts(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Write the cleared rows as CSV with a header. The header is written
    /// even when no period cleared.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        if self.rows.is_empty() {
            wtr.write_record(REPORT_COLUMNS).map_err(|e| Error::Io(e.into()))?;
        }
        for row in &self.rows {
            wtr.serialize(row).map_err(|e| Error::Io(e.into()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the cleared rows to a CSV file.
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(day: u32, period: u8) -> PeriodKey {
        PeriodKey::new(
            NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
            SettlementPeriod::new(period).unwrap(),
        )
    }

    fn cleared(key: PeriodKey, demand: f64, price: f64, cumulative: f64) -> ClearingOutcome {
        ClearingOutcome {
            key,
            demand: Demand::new(demand).unwrap(),
            result: Ok(ClearingPoint {
                price,
                cumulative_volume: cumulative,
                index: 0,
            }),
        }
    }

    #[test]
    fn test_sorted_rows_and_failures() {
        let report = BatchReport::from_outcomes(vec![
            cleared(key(2, 1), 10.0, 50.0, 12.0),
            ClearingOutcome {
                key: key(1, 5),
                demand: Demand::new(900.0).unwrap(),
                result: Err(Error::demand_exceeds_capacity(900.0, 500.0)),
            },
            cleared(key(1, 3), 5.0, 40.0, 6.0),
        ])
        .unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::DemandExceedsCapacity);
        assert_eq!(report.failure_counts()[&ErrorKind::DemandExceedsCapacity], 1);
    }

    #[test]
    fn test_defect_aborts() {
        let result = BatchReport::from_outcomes(vec![
            cleared(key(1, 1), 1.0, 1.0, 1.0),
            ClearingOutcome {
                key: key(1, 2),
                demand: Demand::new(1.0).unwrap(),
                result: Err(Error::no_clearing_row(1.0, 2.0)),
            },
        ]);
        assert!(matches!(result, Err(Error::NoClearingRow { .. })));
    }

    #[test]
    fn test_csv_columns() {
        let report = BatchReport::from_outcomes(vec![cleared(key(1, 2), 150.0, 20.0, 200.0)]).unwrap();
        let mut buffer = Vec::new();
        report.write_csv(&mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("date,period,demand,final_clearing_price,cumulative_volume_at_clearing")
        );
        assert_eq!(lines.next(), Some("2023-01-01,2,150.0,20.0,200.0"));
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let mut buffer = Vec::new();
        BatchReport::default().write_csv(&mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "date,period,demand,final_clearing_price,cumulative_volume_at_clearing\n"
        );
    }

    #[test]
    fn test_all_failed_report_keeps_header() {
        let report = BatchReport::from_outcomes(vec![ClearingOutcome {
            key: key(1, 1),
            demand: Demand::new(10.0).unwrap(),
            result: Err(Error::data_integrity("no bids")),
        }])
        .unwrap();

        let mut buffer = Vec::new();
        report.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text.trim_end(), REPORT_COLUMNS.join(","));
    }

    #[test]
    fn test_write_csv_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let report = BatchReport::from_outcomes(vec![cleared(key(1, 2), 1.0, 2.0, 3.0)]).unwrap();
        report.write_csv_path(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("date,period"));
    }
}
