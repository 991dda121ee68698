//! Offer stack loading.
//!
//! Reads the delayed offer stack export: a short preamble, a header row, then
//! one row per (date, period, price, capacity) offer.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use merit_core::config::IngestionConfig;
use merit_core::{Bid, Config, Error, OfferRecord, PeriodKey, Result, SettlementPeriod};

use crate::columns::{field, parse_number, ColumnMap};
use crate::dates::{DateResolver, ResolvedDate};
use crate::report::{AnomalyKind, IngestionReport};

const DATE: &str = "date";
const PERIOD: &str = "period";
const PRICE: &str = "lowest to highest offer price";
const VOLUME: &str = "total offer capacity at specified offer price";

/// Normalized offers and the load report.
#[derive(Debug, Clone)]
pub struct LoadedOffers {
    /// Accepted offers in file order.
    pub records: Vec<OfferRecord>,
    /// What was dropped or repaired.
    pub report: IngestionReport,
}

/// Loader for offer stack files.
#[derive(Debug, Clone)]
pub struct OfferStackLoader {
    policy: IngestionConfig,
    preamble_rows: usize,
}

struct OfferColumns {
    date: usize,
    period: usize,
    price: usize,
    volume: usize,
}

impl OfferStackLoader {
    /// Create a loader.
    pub fn new(policy: IngestionConfig, preamble_rows: usize) -> Self {
        Self {
            policy,
            preamble_rows,
        }
    }

    /// Create a loader from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ingestion.clone(), config.data.offer_preamble_rows)
    }

    /// Load from a file path.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadedOffers> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::ingestion(format!("cannot open {}: {e}", path.display())))?;
        self.load(file, &path.display().to_string())
    }

    /// Load from any reader. `source` labels the report and error messages.
    pub fn load<R: Read>(&self, reader: R, source: &str) -> Result<LoadedOffers> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = csv_reader.records();

        for _ in 0..self.preamble_rows {
            if rows.next().transpose().map_err(|e| csv_error(source, e))?.is_none() {
                return Err(Error::ingestion(format!("{source}: file ends inside the preamble")));
            }
        }

        let header = rows
            .next()
            .transpose()
            .map_err(|e| csv_error(source, e))?
            .ok_or_else(|| Error::ingestion(format!("{source}: missing header row")))?;
        let map = ColumnMap::from_header(&header);
        let columns = OfferColumns {
            date: map.require(DATE, source)?,
            period: map.require(PERIOD, source)?,
            price: map.require(PRICE, source)?,
            volume: map.require(VOLUME, source)?,
        };

        let mut report = IngestionReport::new(source);
        let mut dates = DateResolver::new(self.policy.invalid_date_policy);
        let mut seen: HashSet<(PeriodKey, u64, u64)> = HashSet::new();
        let mut records = Vec::new();

        for row in rows {
            let row = row.map_err(|e| csv_error(source, e))?;
            report.rows_read += 1;
            let line = row.position().map_or(0, |p| p.line());

            let Some(record) = self.parse_row(&row, &columns, line, &mut dates, &mut report) else {
                continue;
            };

            if self.policy.drop_duplicate_offers {
                let fingerprint = (record.key, record.bid.price.to_bits(), record.bid.volume.to_bits());
                if !seen.insert(fingerprint) {
                    report.record(
                        line,
                        AnomalyKind::DuplicateOffer,
                        format!(
                            "{} price {} volume {} already seen",
                            record.key, record.bid.price, record.bid.volume
                        ),
                    );
                    continue;
                }
            }

            records.push(OfferRecord {
                seq: records.len() as u64,
                ..record
            });
        }

        report.rows_accepted = records.len() as u64;
        report.log_summary();
        report.enforce(self.policy.strict)?;

        Ok(LoadedOffers { records, report })
    }

    fn parse_row(
        &self,
        row: &StringRecord,
        columns: &OfferColumns,
        line: u64,
        dates: &mut DateResolver,
        report: &mut IngestionReport,
    ) -> Option<OfferRecord> {
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

        let price_text = field(row, Some(columns.price));
        let Some(price) = parse_number(price_text) else {
            report.record(
                line,
                AnomalyKind::InvalidPrice,
                format!("price {:?} is not a number", price_text.unwrap_or("")),
            );
            return None;
        };

        let volume_text = field(row, Some(columns.volume));
        let Some(volume) = parse_number(volume_text).filter(|v| *v >= 0.0) else {
            report.record(
                line,
                AnomalyKind::InvalidVolume,
                format!("volume {:?} is not a non-negative number", volume_text.unwrap_or("")),
            );
            return None;
        };

        Some(OfferRecord {
            key: PeriodKey::new(date, period),
            bid: Bid::new(price, volume),
            seq: 0,
        })
    }
}

fn csv_error(source: &str, err: csv::Error) -> Error {
    Error::ingestion(format!("{source}: {err}"))
}
