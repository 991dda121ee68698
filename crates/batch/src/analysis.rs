//! Demand and price analysis over the demand table.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use merit_core::{DemandRecord, Price, SettlementPeriod, TimeOfDay, Volume};
use ordered_float::OrderedFloat;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Which end of the daily demand range a row sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ExtremeKind {
    Min,
    Max,
}

impl fmt::Display for ExtremeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtremeKind::Min => "MIN",
            ExtremeKind::Max => "MAX",
        })
    }
}

/// A period at the daily maximum or minimum demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandExtreme {
    pub date: NaiveDate,
    pub period: SettlementPeriod,
    pub demand: Volume,
    pub kind: ExtremeKind,
}

/// How often a period carries the daily maximum demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeakPeriodCount {
    pub period: SettlementPeriod,
    pub count: usize,
}

/// Aggregates for one time-of-day bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeOfDaySummary {
    pub time_of_day: TimeOfDay,
    /// Mean USEP over rows that publish one.
    pub avg_price: Option<Price>,
    pub avg_demand: Volume,
    pub observations: usize,
}

/// The highest-demand period of a date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPeak {
    pub date: NaiveDate,
    pub period: SettlementPeriod,
    pub demand: Volume,
    pub usep: Option<Price>,
}

/// Intraday USEP spread for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceVolatility {
    pub date: NaiveDate,
    /// Sample standard deviation; absent with fewer than two prices.
    pub std_dev: Option<f64>,
    pub range: Price,
    /// Range over mean; absent when the mean price is zero.
    pub relative: Option<f64>,
}

/// Read-only queries over a set of demand rows.
#[derive(Debug, Clone, Copy)]
pub struct DemandAnalysis<'a> {
    records: &'a [DemandRecord],
}

impl<'a> DemandAnalysis<'a> {
    pub fn new(records: &'a [DemandRecord]) -> Self {
        Self { records }
    }

    fn by_date(&self) -> BTreeMap<NaiveDate, Vec<&'a DemandRecord>> {
        let mut days: BTreeMap<NaiveDate, Vec<&'a DemandRecord>> = BTreeMap::new();
        for record in self.records {
            days.entry(record.key.date).or_default().push(record);
        }
        days
    }

    /// Periods at each date's maximum and minimum demand, ties included.
    ///
    /// Ordered by date, minimum before maximum, then period. A date whose
    /// rows all share one demand reports them as maximum.
    pub fn daily_extremes(&self) -> Vec<DemandExtreme> {
        let mut extremes = Vec::new();
        for (date, rows) in self.by_date() {
            let demands = rows.iter().map(|r| OrderedFloat(r.demand.value()));
            let (Some(max), Some(min)) = (demands.clone().max(), demands.min()) else {
                continue;
            };

            for row in rows {
                let demand = OrderedFloat(row.demand.value());
                let kind = if demand == max {
                    ExtremeKind::Max
                } else if demand == min {
                    ExtremeKind::Min
                } else {
                    continue;
                };
                extremes.push(DemandExtreme {
                    date,
                    period: row.key.period,
                    demand: demand.0,
                    kind,
                });
            }
        }
        extremes.sort_by_key(|e| (e.date, e.kind, e.period));
        extremes
    }

    /// Periods that most often carry the daily maximum, most frequent first.
    pub fn peak_period_frequency(&self, top: usize) -> Vec<PeakPeriodCount> {
        let mut counts: BTreeMap<SettlementPeriod, usize> = BTreeMap::new();
        for extreme in self.daily_extremes() {
            if extreme.kind == ExtremeKind::Max {
                *counts.entry(extreme.period).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<PeakPeriodCount> = counts
            .into_iter()
            .map(|(period, count)| PeakPeriodCount { period, count })
            .collect();
        // count descending, earlier period first on ties
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.period.cmp(&b.period)));
        ranked.truncate(top);
        ranked
    }

    /// Average price and demand per time-of-day bucket, dearest first.
    pub fn time_of_day_summary(&self) -> Vec<TimeOfDaySummary> {
        let mut buckets: BTreeMap<TimeOfDay, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for record in self.records {
            let (prices, demands) = buckets.entry(record.key.period.time_of_day()).or_default();
            prices.extend(record.usep);
            demands.push(record.demand.value());
        }

        let mut summary: Vec<TimeOfDaySummary> = buckets
            .into_iter()
            .map(|(time_of_day, (prices, demands))| TimeOfDaySummary {
                time_of_day,
                avg_price: (!prices.is_empty()).then(|| Statistics::mean(&prices)),
                avg_demand: Statistics::mean(&demands),
                observations: demands.len(),
            })
            .collect();
        // buckets without prices sort last
        summary.sort_by_key(|s| std::cmp::Reverse(s.avg_price.map(OrderedFloat)));
        summary
    }

    /// Each date's highest-demand period(s), highest demand first.
    pub fn daily_peaks(&self) -> Vec<DailyPeak> {
        let mut peaks: Vec<DailyPeak> = self
            .daily_extremes()
            .into_iter()
            .filter(|e| e.kind == ExtremeKind::Max)
            .filter_map(|e| {
                self.records
                    .iter()
                    .find(|r| r.key.date == e.date && r.key.period == e.period)
                    .map(|r| DailyPeak {
                        date: e.date,
                        period: e.period,
                        demand: e.demand,
                        usep: r.usep,
                    })
            })
            .collect();
        peaks.sort_by(|a, b| {
            OrderedFloat(b.demand)
                .cmp(&OrderedFloat(a.demand))
                .then(a.date.cmp(&b.date))
                .then(a.period.cmp(&b.period))
        });
        peaks
    }

    /// Dates with the most volatile USEP, by sample standard deviation.
    pub fn price_volatility(&self, top: usize) -> Vec<PriceVolatility> {
        let mut days: Vec<PriceVolatility> = self
            .by_date()
            .into_iter()
            .filter_map(|(date, rows)| {
                let prices: Vec<f64> = rows.iter().filter_map(|r| r.usep).collect();
                if prices.is_empty() {
                    return None;
                }
                let high = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let low = prices.iter().copied().fold(f64::INFINITY, f64::min);
                let range = high - low;
                let mean = Statistics::mean(&prices);
                let std_dev = Statistics::std_dev(&prices);
                Some(PriceVolatility {
                    date,
                    std_dev: std_dev.is_finite().then_some(std_dev),
                    range,
                    relative: (mean != 0.0).then(|| range / mean),
                })
            })
            .collect();

        days.sort_by(|a, b| {
            b.std_dev
                .map(OrderedFloat)
                .cmp(&a.std_dev.map(OrderedFloat))
                .then(a.date.cmp(&b.date))
        });
        days.truncate(top);
        days
    }
}
