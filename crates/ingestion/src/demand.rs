//! Demand reference table loading.
//!
//! Reads the per-period price and demand publication (information type,
//! date, period, USEP, LCP, demand, TCL). Demand is required; the price and
//! loss columns are optional.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use merit_core::config::IngestionConfig;
use merit_core::{Config, Demand, DemandRecord, Error, PeriodKey, Result, SettlementPeriod};

use crate::columns::{field, parse_number, ColumnMap};
use crate::dates::{DateResolver, ResolvedDate};
use crate::report::{AnomalyKind, IngestionReport};

/// Normalized demand rows and the load report.
#[derive(Debug, Clone)]
pub struct LoadedDemand {
    /// Accepted rows, at most one per period, in file order.
    pub records: Vec<DemandRecord>,
    /// What was dropped or repaired.
    pub report: IngestionReport,
}

/// Loader for demand files.
#[derive(Debug, Clone)]
pub struct DemandLoader {
    policy: IngestionConfig,
}

struct DemandColumns {
    information_type: Option<usize>,
    date: usize,
    period: usize,
    usep: Option<usize>,
    lcp: Option<usize>,
    demand: usize,
    tcl: Option<usize>,
}

impl DemandLoader {
    /// Create a loader.
    pub fn new(policy: IngestionConfig) -> Self {
        Self { policy }
    }

    /// Create a loader from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ingestion.clone())
    }

    /// Load from a file path.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadedDemand> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::ingestion(format!("cannot open {}: {e}", path.display())))?;
        self.load(file, &path.display().to_string())
    }

    /// Load from any reader. `source` labels the report and error messages.
    pub fn load<R: Read>(&self, reader: R, source: &str) -> Result<LoadedDemand> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header = csv_reader
            .headers()
            .map_err(|e| Error::ingestion(format!("{source}: {e}")))?
            .clone();
        let map = ColumnMap::from_header(&header);
        let columns = DemandColumns {
            information_type: map.find("information type"),
            date: map.require("date", source)?,
            period: map.require("period", source)?,
            usep: map.find("usep"),
            lcp: map.find("lcp"),
            demand: map.require("demand", source)?,
            tcl: map.find("tcl"),
        };

        let mut report = IngestionReport::new(source);
        let mut dates = DateResolver::new(self.policy.invalid_date_policy);
        let mut seen: HashSet<PeriodKey> = HashSet::new();
        let mut records = Vec::new();

        for row in csv_reader.records() {
            let row = row.map_err(|e| Error::ingestion(format!("{source}: {e}")))?;
            report.rows_read += 1;
            let line = row.position().map_or(0, |p| p.line());

            let Some(record) = parse_row(&row, &columns, line, &mut dates, &mut report) else {
                continue;
            };

            if !seen.insert(record.key) {
                report.record(
                    line,
                    AnomalyKind::DuplicateDemand,
                    format!("{} already has a demand row", record.key),
                );
                continue;
            }

            records.push(record);
        }

        report.rows_accepted = records.len() as u64;
        report.log_summary();
        report.enforce(self.policy.strict)?;

        Ok(LoadedDemand { records, report })
    }
}

fn parse_row(
    row: &StringRecord,
    columns: &DemandColumns,
    line: u64,
    dates: &mut DateResolver,
    report: &mut IngestionReport,
) -> Option<DemandRecord> {
    let date_text = field(row, Some(columns.date));
    let date = match dates.resolve(date_text) {
        ResolvedDate::Parsed(date) => date,
        ResolvedDate::CarriedForward(date) => {
            report.record(
                line,
                AnomalyKind::CarriedForwardDate,
                format!("date {:?} replaced by {date}", date_text.unwrap_or("")),
            );
            date
        }
        ResolvedDate::Rejected => {
            report.record(
                line,
                AnomalyKind::InvalidDate,
                format!("date {:?} is not a valid date", date_text.unwrap_or("")),
            );
            return None;
        }
    };

    let period_text = field(row, Some(columns.period));
    let Some(period) = period_text
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(|p| SettlementPeriod::from_i64(p).ok())
    else {
        report.record(
            line,
            AnomalyKind::InvalidPeriod,
            format!("period {:?} is not in 1-48", period_text.unwrap_or("")),
        );
        return None;
    };

    let demand_text = field(row, Some(columns.demand));
    let Some(demand) = parse_number(demand_text).and_then(|v| Demand::new(v).ok()) else {
        report.record(
            line,
            AnomalyKind::InvalidDemand,
            format!("demand {:?} is not a non-negative number", demand_text.unwrap_or("")),
        );
        return None;
    };

    // prices may go negative; losses may not
    let mut optional = |name: &str, index: Option<usize>, non_negative: bool| -> Option<f64> {
        // absent column: nothing to report
        let index = index?;
        let text = field(row, Some(index));
        let value = parse_number(text).filter(|v| !non_negative || *v >= 0.0);
        if value.is_none() {
            let expected = if non_negative { "a non-negative number" } else { "a number" };
            report.record(
                line,
                AnomalyKind::MissingOptionalField,
                format!("{name} {:?} is not {expected}", text.unwrap_or("")),
            );
        }
        value
    };

    let usep = optional("usep", columns.usep, false);
    let lcp = optional("lcp", columns.lcp, false);
    let tcl = optional("tcl", columns.tcl, true);

    Some(DemandRecord {
        key: PeriodKey::new(date, period),
        information_type: field(row, columns.information_type).map(str::to_string),
        demand,
        usep,
        lcp,
        tcl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    const HEADER: &str = "INFORMATION TYPE,DATE,PERIOD,USEP ($/MWh),LCP ($/MWh),DEMAND (MW),TCL (MW)";

    fn load(rows: &[&str]) -> LoadedDemand {
        let mut text = String::from(HEADER);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        DemandLoader::new(IngestionConfig::default())
            .load(text.as_bytes(), "usep.csv")
            .unwrap()
    }

    #[test]
    fn test_load_clean_rows() {
        let loaded = load(&[
            "USEP,01 Jan 2023,1,132.45,133.10,5420.123,40.5",
            "USEP,01 Jan 2023,2,128.00,129.00,5300,39",
        ]);

        assert!(loaded.report.is_clean());
        assert_eq!(loaded.records.len(), 2);
        let first = &loaded.records[0];
        assert_eq!(first.key.date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(first.information_type.as_deref(), Some("USEP"));
        assert_relative_eq!(first.demand.value(), 5420.123);
        assert_eq!(first.usep, Some(132.45));
        assert_eq!(first.tcl, Some(40.5));
    }

    #[test]
    fn test_invalid_and_duplicate_rows() {
        let loaded = load(&[
            "USEP,01 Jan 2023,1,132.45,133.10,5420,40",
            "USEP,01 Jan 2023,1,140.00,141.00,5500,41",
            "USEP,01 Jan 2023,2,132.45,133.10,-1,40",
            "USEP,01 Jan 2023,0,132.45,133.10,5000,40",
            "USEP,40 Jan 2023,3,132.45,133.10,5000,40",
        ]);

        assert_eq!(loaded.records.len(), 1);
        assert_relative_eq!(loaded.records[0].demand.value(), 5420.0);
        let kinds: Vec<AnomalyKind> = loaded.report.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::DuplicateDemand,
                AnomalyKind::InvalidDemand,
                AnomalyKind::InvalidPeriod,
                AnomalyKind::InvalidDate,
            ]
        );
        assert_eq!(loaded.report.rows_dropped(), 4);
    }

    #[test]
    fn test_optional_fields_kept_as_absent() {
        let loaded = load(&["USEP,01 Jan 2023,7,,n/a,6000,"]);

        assert_eq!(loaded.records.len(), 1);
        let record = &loaded.records[0];
        assert_eq!(record.usep, None);
        assert_eq!(record.lcp, None);
        assert_eq!(record.tcl, None);
        assert_eq!(loaded.report.anomalies.len(), 3);
        assert!(loaded
            .report
            .anomalies
            .iter()
            .all(|a| a.kind == AnomalyKind::MissingOptionalField));
    }

    #[test]
    fn test_negative_prices_kept() {
        let loaded = load(&["USEP,01 Jan 2023,3,-4999.5,-12.25,5100,-1"]);

        assert_eq!(loaded.records.len(), 1);
        let record = &loaded.records[0];
        assert_eq!(record.usep, Some(-4999.5));
        assert_eq!(record.lcp, Some(-12.25));
        assert_eq!(record.tcl, None);
        assert_eq!(loaded.report.anomalies.len(), 1);
        assert!(loaded.report.anomalies[0].detail.starts_with("tcl"));
    }

    #[test]
    fn test_minimal_columns() {
        let text = "DATE,PERIOD,DEMAND (MW)\n2023-01-05,48,6100.5\n";
        let loaded = DemandLoader::new(IngestionConfig::default())
            .load(text.as_bytes(), "minimal.csv")
            .unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].key.period.number(), 48);
        assert_eq!(loaded.records[0].usep, None);
        assert!(loaded.report.is_clean());
    }
}
