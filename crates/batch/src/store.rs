//! DuckDB-backed clearing.
//!
//! Offers and demand are loaded into tables, the merit order and cumulative
//! volume are computed with a window function, and clearing is a lookup of
//! the first stack row whose cumulative volume reaches the demand. The store
//! owns one explicitly opened connection; there is no shared handle.

use std::collections::HashSet;
use std::path::Path;

use duckdb::{params, Connection};
use merit_clearing::ClearingPoint;
use merit_core::config::BatchConfig;
use merit_core::{Demand, DemandRecord, Error, OfferRecord, PeriodKey, Result, SettlementPeriod};
use tracing::{debug, info};

use crate::report::{BatchReport, ClearingOutcome};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS merit_validation (
    trading_date DATE NOT NULL,
    period INTEGER NOT NULL,
    bid_price DOUBLE NOT NULL,
    bid_volume DOUBLE NOT NULL,
    seq BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS demand_validation (
    trading_date DATE NOT NULL,
    period INTEGER NOT NULL,
    information_type VARCHAR,
    usep_price DOUBLE,
    lcp_price DOUBLE,
    demand_mw DOUBLE NOT NULL,
    tcl_mw DOUBLE
);
CREATE TABLE IF NOT EXISTS merit_cumulative (
    trading_date DATE NOT NULL,
    period INTEGER NOT NULL,
    bid_price DOUBLE NOT NULL,
    bid_volume DOUBLE NOT NULL,
    seq BIGINT NOT NULL,
    cumulative_volume DOUBLE NOT NULL,
    stack_index BIGINT NOT NULL
);
";

const BUILD_CUMULATIVE: &str = "
CREATE OR REPLACE TABLE merit_cumulative AS
SELECT
    trading_date,
    period,
    bid_price,
    bid_volume,
    seq,
    SUM(bid_volume) OVER (
        PARTITION BY trading_date, period
        ORDER BY bid_price, seq
        ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
    ) AS cumulative_volume,
    ROW_NUMBER() OVER (
        PARTITION BY trading_date, period
        ORDER BY bid_price, seq
    ) - 1 AS stack_index
FROM merit_validation
";

const CAPACITY: &str = "
SELECT COUNT(*), MAX(cumulative_volume)
FROM merit_cumulative
WHERE trading_date = CAST(? AS DATE) AND period = ?
";

const MARGINAL_ROW: &str = "
SELECT bid_price, cumulative_volume, stack_index
FROM merit_cumulative
WHERE trading_date = CAST(? AS DATE) AND period = ? AND cumulative_volume >= ?
ORDER BY stack_index
LIMIT 1
";

const CLEAR_ALL: &str = "
WITH capacity AS (
    SELECT trading_date, period, MAX(cumulative_volume) AS max_volume
    FROM merit_cumulative
    GROUP BY trading_date, period
),
candidates AS (
    SELECT
        d.trading_date,
        d.period,
        m.bid_price,
        m.cumulative_volume,
        m.stack_index,
        ROW_NUMBER() OVER (
            PARTITION BY d.trading_date, d.period
            ORDER BY m.stack_index
        ) AS rn
    FROM demand_validation d
    JOIN merit_cumulative m
      ON m.trading_date = d.trading_date
     AND m.period = d.period
     AND m.cumulative_volume >= d.demand_mw
)
SELECT
    strftime(d.trading_date, '%Y-%m-%d'),
    d.period,
    d.demand_mw,
    c.max_volume,
    k.bid_price,
    k.cumulative_volume,
    k.stack_index
FROM demand_validation d
LEFT JOIN capacity c
  ON c.trading_date = d.trading_date AND c.period = d.period
LEFT JOIN candidates k
  ON k.trading_date = d.trading_date AND k.period = d.period AND k.rn = 1
ORDER BY d.trading_date, d.period
";

/// One row of the `CLEAR_ALL` query.
struct ClearAllRow {
    date: String,
    period: i32,
    demand: f64,
    max_volume: Option<f64>,
    price: Option<f64>,
    cumulative_volume: Option<f64>,
    stack_index: Option<i64>,
}

/// Clearing store over a DuckDB connection.
pub struct MeritStore {
    conn: Connection,
}

impl MeritStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("cannot open {}: {e}", path.display())))?;
        info!(path = %path.display(), "opened clearing store");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::with_connection(conn)
    }

    /// Open the database named in the batch config, or an in-memory one.
    pub fn from_config(config: &BatchConfig) -> Result<Self> {
        match &config.database_path {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self { conn })
    }

    /// Close the connection, surfacing any error on shutdown.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| db(e))
    }

    /// Replace the contents of `merit_validation` with `records`.
    ///
    /// Rows that break the bid invariants are refused as a whole batch.
    pub fn load_offers(&mut self, records: &[OfferRecord]) -> Result<()> {
        for record in records {
            record
                .bid
                .check()
                .map_err(|msg| Error::data_integrity(format!("{}: {msg}", record.key)))?;
        }

        let tx = self.conn.transaction().map_err(db)?;
        tx.execute_batch("DELETE FROM merit_validation").map_err(db)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO merit_validation (trading_date, period, bid_price, bid_volume, seq)
                     VALUES (CAST(? AS DATE), ?, ?, ?, ?)",
                )
                .map_err(db)?;
            for record in records {
                let seq = i64::try_from(record.seq)
                    .map_err(|_| Error::data_integrity(format!("sequence {} out of range", record.seq)))?;
                stmt.execute(params![
                    date_param(&record.key),
                    i32::from(record.key.period.number()),
                    record.bid.price,
                    record.bid.volume,
                    seq,
                ])
                .map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;

        debug!(rows = records.len(), "loaded offers");
        Ok(())
    }

    /// Replace the contents of `demand_validation` with `records`.
    ///
    /// At most one row per period is accepted.
    pub fn load_demand(&mut self, records: &[DemandRecord]) -> Result<()> {
        let mut seen = HashSet::new();
        for record in records {
            if !seen.insert(record.key) {
                return Err(Error::data_integrity(format!("{} has more than one demand row", record.key)));
            }
        }

        let tx = self.conn.transaction().map_err(db)?;
        tx.execute_batch("DELETE FROM demand_validation").map_err(db)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO demand_validation
                        (trading_date, period, information_type, usep_price, lcp_price, demand_mw, tcl_mw)
                     VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, ?)",
                )
                .map_err(db)?;
            for record in records {
                stmt.execute(params![
                    date_param(&record.key),
                    i32::from(record.key.period.number()),
                    record.information_type.as_deref(),
                    record.usep,
                    record.lcp,
                    record.demand.value(),
                    record.tcl,
                ])
                .map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;

        debug!(rows = records.len(), "loaded demand");
        Ok(())
    }

    /// Rebuild `merit_cumulative` from the loaded offers.
    pub fn build_cumulative(&self) -> Result<()> {
        self.conn.execute_batch(BUILD_CUMULATIVE).map_err(db)?;
        info!(rows = self.count("merit_cumulative")?, "built cumulative merit order");
        Ok(())
    }

    /// Clear one period against `merit_cumulative`.
    ///
    /// Checks run in the same order as the in-memory engine.
    pub fn clearing_price(&self, key: &PeriodKey, demand: Demand) -> Result<ClearingPoint> {
        let date = date_param(key);
        let period = i32::from(key.period.number());

        let (bids, max_volume): (i64, Option<f64>) = self
            .conn
            .query_row(CAPACITY, params![date, period], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db)?;
        let max_volume = match max_volume {
            Some(max_volume) if bids > 0 => max_volume,
            _ => return Err(Error::data_integrity(format!("no bids found for {key}"))),
        };

        let demand = demand.value();
        if demand > max_volume {
            return Err(Error::demand_exceeds_capacity(demand, max_volume));
        }

        let mut stmt = self.conn.prepare(MARGINAL_ROW).map_err(db)?;
        let mut rows = stmt.query(params![date, period, demand]).map_err(db)?;
        let Some(row) = rows.next().map_err(db)? else {
            return Err(Error::no_clearing_row(demand, max_volume));
        };

        let price: f64 = row.get(0).map_err(db)?;
        let cumulative_volume: f64 = row.get(1).map_err(db)?;
        let stack_index: i64 = row.get(2).map_err(db)?;
        Ok(ClearingPoint {
            price,
            cumulative_volume,
            index: stack_index_to_usize(stack_index)?,
        })
    }

    /// Clear every demand row in one query.
    pub fn clear_all(&self) -> Result<BatchReport> {
        let mut stmt = self.conn.prepare(CLEAR_ALL).map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ClearAllRow {
                    date: row.get(0)?,
                    period: row.get(1)?,
                    demand: row.get(2)?,
                    max_volume: row.get(3)?,
                    price: row.get(4)?,
                    cumulative_volume: row.get(5)?,
                    stack_index: row.get(6)?,
                })
            })
            .map_err(db)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db)?;

        info!(periods = rows.len(), "clearing all periods in store");

        let outcomes = rows
            .into_iter()
            .map(classify)
            .collect::<Result<Vec<_>>>()?;
        BatchReport::from_outcomes(outcomes)
    }

    /// Rows in `merit_validation`.
    pub fn offer_count(&self) -> Result<u64> {
        self.count("merit_validation")
    }

    /// Rows in `demand_validation`.
    pub fn demand_count(&self) -> Result<u64> {
        self.count("demand_validation")
    }

    fn count(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(db)?;
        Ok(n.max(0) as u64)
    }
}

fn classify(row: ClearAllRow) -> Result<ClearingOutcome> {
    let date = chrono::NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("unexpected date {:?} from store: {e}", row.date)))?;
    let key = PeriodKey::new(date, SettlementPeriod::from_i64(i64::from(row.period))?);
    let demand = Demand::new(row.demand)?;

    let result = match (row.max_volume, row.price, row.cumulative_volume, row.stack_index) {
        (None, ..) => Err(Error::data_integrity(format!("no bids found for {key}"))),
        (Some(max_volume), ..) if row.demand > max_volume => {
            Err(Error::demand_exceeds_capacity(row.demand, max_volume))
        }
        (Some(_), Some(price), Some(cumulative_volume), Some(index)) => Ok(ClearingPoint {
            price,
            cumulative_volume,
            index: stack_index_to_usize(index)?,
        }),
        (Some(max_volume), ..) => Err(Error::no_clearing_row(row.demand, max_volume)),
    };

    Ok(ClearingOutcome { key, demand, result })
}

fn date_param(key: &PeriodKey) -> String {
    key.date.format("%Y-%m-%d").to_string()
}

fn stack_index_to_usize(index: i64) -> Result<usize> {
    usize::try_from(index).map_err(|_| Error::database(format!("negative stack index {index}")))
}

fn db(err: duckdb::Error) -> Error {
    Error::database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::BatchRunner;
    use chrono::NaiveDate;
    use merit_clearing::OfferBook;
    use merit_core::{Bid, ErrorKind};

    fn key(day: u32, period: u8) -> PeriodKey {
        PeriodKey::new(
            NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
            SettlementPeriod::new(period).unwrap(),
        )
    }

    fn offers() -> Vec<OfferRecord> {
        let rows = [
            (key(1, 1), 50.0, 100.0),
            (key(1, 1), 10.0, 100.0),
            (key(1, 1), 30.0, 100.0),
            (key(1, 1), 20.0, 100.0),
            (key(1, 1), 40.0, 100.0),
            (key(1, 2), 20.0, 50.0),
            (key(1, 2), 20.0, 0.0),
            (key(1, 2), 5.0, 0.0),
            (key(1, 2), 20.0, 25.0),
        ];
        rows.iter()
            .enumerate()
            .map(|(seq, (key, price, volume))| OfferRecord {
                key: *key,
                bid: Bid::new(*price, *volume),
                seq: seq as u64,
            })
            .collect()
    }

    fn demand_row(key: PeriodKey, demand: f64) -> DemandRecord {
        DemandRecord {
            key,
            information_type: Some("USEP".to_string()),
            demand: Demand::new(demand).unwrap(),
            usep: Some(100.0),
            lcp: None,
            tcl: Some(40.0),
        }
    }

    fn store() -> MeritStore {
        let mut store = MeritStore::open_in_memory().unwrap();
        store.load_offers(&offers()).unwrap();
        store.build_cumulative().unwrap();
        store
    }

    #[test]
    fn test_clearing_price_scenarios() {
        let store = store();
        let at = |demand: f64| store.clearing_price(&key(1, 1), Demand::new(demand).unwrap());

        assert_eq!(at(150.0).unwrap().price, 20.0);
        assert_eq!(at(150.0).unwrap().cumulative_volume, 200.0);
        assert_eq!(at(100.0).unwrap().price, 10.0);
        assert_eq!(at(0.0).unwrap().price, 10.0);
        assert_eq!(at(500.0).unwrap().price, 50.0);
        assert!(matches!(at(501.0), Err(Error::DemandExceedsCapacity { .. })));
    }

    #[test]
    fn test_ties_follow_input_order() {
        let store = store();
        // stack: 5/0 (seq 7), 20/50 (seq 5), 20/0 (seq 6), 20/25 (seq 8)
        let point = store.clearing_price(&key(1, 2), Demand::new(0.0).unwrap()).unwrap();
        assert_eq!(point.price, 5.0);
        assert_eq!(point.index, 0);

        let point = store.clearing_price(&key(1, 2), Demand::new(50.0).unwrap()).unwrap();
        assert_eq!(point.index, 1);
        assert_eq!(point.cumulative_volume, 50.0);
    }

    #[test]
    fn test_missing_period() {
        let store = store();
        let err = store.clearing_price(&key(5, 5), Demand::new(1.0).unwrap()).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[test]
    fn test_rejects_invalid_offers() {
        let mut store = MeritStore::open_in_memory().unwrap();
        let bad = [OfferRecord {
            key: key(1, 1),
            bid: Bid::new(10.0, -1.0),
            seq: 0,
        }];
        assert!(matches!(store.load_offers(&bad), Err(Error::DataIntegrity(_))));
        assert_eq!(store.offer_count().unwrap(), 0);
    }

    #[test]
    fn test_clear_all_agrees_with_memory() {
        let demand = vec![
            demand_row(key(2, 1), 1.0),
            demand_row(key(1, 2), 60.0),
            demand_row(key(1, 1), 150.0),
        ];

        let mut store = store();
        store.load_demand(&demand).unwrap();
        assert_eq!(store.demand_count().unwrap(), 3);
        let from_store = store.clear_all().unwrap();

        let book = OfferBook::from_records(offers());
        let from_memory = BatchRunner::new(2).run(&book, &demand).unwrap();

        assert_eq!(from_store.rows, from_memory.rows);
        assert_eq!(from_store.rows.len(), 2);
        assert_eq!(from_store.rows[1].final_clearing_price, 20.0);
        assert_eq!(from_store.rows[1].cumulative_volume_at_clearing, 75.0);

        assert_eq!(from_store.failures.len(), 1);
        assert_eq!(from_store.failures[0].kind, ErrorKind::DataIntegrity);
        assert_eq!(from_store.failures[0].kind, from_memory.failures[0].kind);

        store.close().unwrap();
    }

    #[test]
    fn test_clear_all_capacity_failure() {
        let mut store = store();
        store.load_demand(&[demand_row(key(1, 2), 75.5)]).unwrap();
        let report = store.clear_all().unwrap();
        assert!(report.rows.is_empty());
        assert_eq!(report.failures[0].kind, ErrorKind::DemandExceedsCapacity);
    }

    fn run_file_batch(path: &Path, demand: &[DemandRecord]) -> BatchReport {
        let mut store = MeritStore::open(path).unwrap();
        store.load_offers(&offers()).unwrap();
        store.load_demand(demand).unwrap();
        store.build_cumulative().unwrap();
        let report = store.clear_all().unwrap();
        store.close().unwrap();
        report
    }

    #[test]
    fn test_rerun_on_file_replaces_previous_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merit.duckdb");
        let demand = [demand_row(key(1, 1), 150.0)];

        let first = run_file_batch(&path, &demand);
        let second = run_file_batch(&path, &demand);

        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.rows[0].final_clearing_price, 20.0);
        assert_eq!(first.rows[0].cumulative_volume_at_clearing, 200.0);
        assert_eq!(second.rows, first.rows);

        let store = MeritStore::open(&path).unwrap();
        assert_eq!(store.offer_count().unwrap(), 9);
        assert_eq!(store.demand_count().unwrap(), 1);
    }

    #[test]
    fn test_rejects_duplicate_demand_keys() {
        let mut store = store();
        let demand = [demand_row(key(1, 1), 150.0), demand_row(key(1, 1), 200.0)];
        assert!(matches!(store.load_demand(&demand), Err(Error::DataIntegrity(_))));
        assert_eq!(store.demand_count().unwrap(), 0);
    }

    #[test]
    fn test_classify_missing_marginal_row_is_defect() {
        let outcome = classify(ClearAllRow {
            date: "2023-01-04".to_string(),
            period: 12,
            demand: 80.0,
            max_volume: Some(100.0),
            price: None,
            cumulative_volume: None,
            stack_index: None,
        })
        .unwrap();

        assert_eq!(outcome.key, key(4, 12));
        match outcome.result {
            Err(Error::NoClearingRow { demand, max_volume }) => {
                assert_eq!(demand, 80.0);
                assert_eq!(max_volume, 100.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_classify_without_bids() {
        let outcome = classify(ClearAllRow {
            date: "2023-01-04".to_string(),
            period: 12,
            demand: 80.0,
            max_volume: None,
            price: None,
            cumulative_volume: None,
            stack_index: None,
        })
        .unwrap();
        assert!(matches!(outcome.result, Err(Error::DataIntegrity(_))));
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merit.duckdb");

        let mut store = MeritStore::open(&path).unwrap();
        store.load_offers(&offers()).unwrap();
        store.close().unwrap();

        let store = MeritStore::open(&path).unwrap();
        assert_eq!(store.offer_count().unwrap(), 9);
        store.build_cumulative().unwrap();
        let price = store.clearing_price(&key(1, 1), Demand::new(250.0).unwrap()).unwrap().price;
        assert_eq!(price, 30.0);
    }
}
