//! Core data types for the merit-order clearing system.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Offer price per unit of volume ($/MWh).
pub type Price = f64;

/// Offered or demanded quantity (MW).
pub type Volume = f64;

/// Number of half-hour settlement periods in a trading day.
pub const PERIODS_PER_DAY: u8 = 48;

/// Length of one settlement period in minutes.
pub const PERIOD_MINUTES: i64 = 30;

/// One unit of committed supply for a given date and period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Offer price.
    pub price: Price,
    /// Quantity offered at that price (>= 0).
    pub volume: Volume,
}

impl Bid {
    /// Create a new bid.
    pub fn new(price: Price, volume: Volume) -> Self {
        Self { price, volume }
    }

    /// Totally ordered price, used as the merit-order sort key.
    #[inline]
    pub fn price_key(&self) -> OrderedFloat<f64> {
        OrderedFloat(self.price)
    }

    /// Check the row-level invariants: finite price, finite non-negative volume.
    pub fn check(&self) -> std::result::Result<(), String> {
        if !self.price.is_finite() {
            return Err(format!("price {} is not a finite number", self.price));
        }
        if !self.volume.is_finite() {
            return Err(format!("volume {} is not a finite number", self.volume));
        }
        if self.volume < 0.0 {
            return Err(format!("volume {} is negative", self.volume));
        }
        Ok(())
    }
}

/// Quantity to be cleared against a bid stack.
///
/// Only constructible through [`Demand::new`], so a value of this type is
/// always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Demand(f64);

impl Demand {
    /// Validate a raw demand value.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::validation(format!("{value} is not a valid number")));
        }
        if value < 0.0 {
            return Err(Error::validation(format!("{value} is not a non-negative number")));
        }
        Ok(Self(value))
    }

    /// Parse demand from user text.
    pub fn parse(text: &str) -> Result<Self> {
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|_| Error::validation(format!("{text} is not a valid number")))?;
        Self::new(value)
    }

    /// Get the raw value.
    #[inline]
    pub fn value(self) -> Volume {
        self.0
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Demand {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Demand::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Half-hour settlement period, numbered 1..=48 within a trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SettlementPeriod(u8);

impl SettlementPeriod {
    /// Validate a period number.
    pub fn new(period: u8) -> Result<Self> {
        if (1..=PERIODS_PER_DAY).contains(&period) {
            Ok(Self(period))
        } else {
            Err(Error::validation(format!(
                "period {period} is outside 1-{PERIODS_PER_DAY}"
            )))
        }
    }

    /// Validate a period from a wider integer (as read from files or SQL).
    pub fn from_i64(period: i64) -> Result<Self> {
        u8::try_from(period)
            .map_err(|_| Error::validation(format!("period {period} is outside 1-{PERIODS_PER_DAY}")))
            .and_then(Self::new)
    }

    /// Period number (1-based).
    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }

    /// Offset of the period start from midnight: period 1 starts at 00:00.
    pub fn start_offset(self) -> Duration {
        Duration::minutes(i64::from(self.0 - 1) * PERIOD_MINUTES)
    }

    /// Wall-clock start of the period.
    pub fn start_time(self) -> NaiveTime {
        NaiveTime::MIN + self.start_offset()
    }

    /// Time-of-day bucket the period belongs to.
    pub fn time_of_day(self) -> TimeOfDay {
        match self.0 {
            14..=36 => TimeOfDay::Daytime,
            37..=44 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

impl TryFrom<u8> for SettlementPeriod {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SettlementPeriod> for u8 {
    fn from(period: SettlementPeriod) -> u8 {
        period.0
    }
}

impl fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse time-of-day grouping of settlement periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// Periods 14-36.
    Daytime,
    /// Periods 37-44.
    Evening,
    /// Periods 45-48 and 1-13.
    Night,
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimeOfDay::Daytime => "Daytime",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        };
        f.write_str(label)
    }
}

/// Identifies one trading period snapshot: a calendar date and a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    /// Trading date.
    pub date: NaiveDate,
    /// Settlement period within the date.
    pub period: SettlementPeriod,
}

impl PeriodKey {
    /// Create a new key.
    pub fn new(date: NaiveDate, period: SettlementPeriod) -> Self {
        Self { date, period }
    }

    /// Timestamp of the period start.
    pub fn start_datetime(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN) + self.period.start_offset()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} period {}", self.date.format("%Y-%m-%d"), self.period)
    }
}

/// A normalized offer row from the offer-stack source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    /// Period the offer belongs to.
    pub key: PeriodKey,
    /// Price and volume.
    pub bid: Bid,
    /// Input ordinal, the tie-break for equal prices.
    pub seq: u64,
}

/// A normalized row from the demand reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    /// Period the demand applies to.
    pub key: PeriodKey,
    /// Information type column (e.g. "Final").
    pub information_type: Option<String>,
    /// Demand to clear.
    pub demand: Demand,
    /// Published uniform price.
    pub usep: Option<Price>,
    /// Load currency price.
    pub lcp: Option<Price>,
    /// Transmission loss.
    pub tcl: Option<Volume>,
}

/// Inclusive calendar range accepted at the caller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First accepted date.
    pub start: NaiveDate,
    /// Last accepted date.
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a new range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::config(format!("date range start {start} is after end {end}")));
        }
        Ok(Self { start, end })
    }

    /// Check membership.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        // January 2023, the reference deployment's data window.
        Self {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2023, 1, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

/// Parse a caller-supplied date in strict `YYYY-MM-DD` form and check it
/// against the accepted range.
pub fn parse_trading_date(text: &str, range: &DateRange) -> Result<NaiveDate> {
    let bytes = text.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !well_formed {
        return Err(Error::validation(format!(
            "date {text} must be in exactly YYYY-MM-DD format with leading zeros"
        )));
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("date {text} is not a valid calendar date")))?;

    if !range.contains(date) {
        return Err(Error::validation(format!(
            "date must be between {} and {}",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        )));
    }

    Ok(date)
}
