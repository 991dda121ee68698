//! Source date parsing.
//!
//! Source files mix `01 Jan 2023`, `01-Jan-2023` and ISO dates. Rows whose
//! date cannot be parsed are handled according to [`InvalidDatePolicy`].

use chrono::NaiveDate;
use merit_core::config::InvalidDatePolicy;

/// Formats accepted in source files, tried in order.
const SOURCE_DATE_FORMATS: [&str; 3] = ["%d %b %Y", "%d-%b-%Y", "%Y-%m-%d"];

/// Parse a date as written in a source file.
pub fn parse_source_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    SOURCE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Outcome of resolving one row's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDate {
    /// Parsed as written.
    Parsed(NaiveDate),
    /// Unparseable; replaced by the previous valid date.
    CarriedForward(NaiveDate),
    /// Unparseable and not repaired.
    Rejected,
}

/// Resolves row dates in file order, remembering the last valid one.
#[derive(Debug, Clone)]
pub struct DateResolver {
    policy: InvalidDatePolicy,
    last_valid: Option<NaiveDate>,
}

impl DateResolver {
    /// Create a resolver for one file.
    pub fn new(policy: InvalidDatePolicy) -> Self {
        Self {
            policy,
            last_valid: None,
        }
    }

    /// Resolve the date field of the next row.
    pub fn resolve(&mut self, text: Option<&str>) -> ResolvedDate {
        if let Some(date) = text.and_then(parse_source_date) {
            self.last_valid = Some(date);
            return ResolvedDate::Parsed(date);
        }

        match (self.policy, self.last_valid) {
            (InvalidDatePolicy::CarryForward, Some(previous)) => ResolvedDate::CarriedForward(previous),
            _ => ResolvedDate::Rejected,
        }
    }
}
