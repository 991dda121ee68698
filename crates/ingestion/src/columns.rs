//! Header normalization and column lookup.

use csv::StringRecord;
use merit_core::{Error, Result};

/// Normalize a source column name: drop parenthesised unit suffixes, trim,
/// lowercase. `"Total Offer Capacity At Specified Offer Price (MW)"` becomes
/// `"total offer capacity at specified offer price"`.
pub fn normalize_column(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;

    for ch in name.chars() {
        match ch {
            '(' => {
                if depth == 0 {
                    let kept = out.trim_end().len();
                    out.truncate(kept);
                }
                depth += 1;
            }
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }

    out.trim().to_lowercase()
}

/// Positions of named columns in a normalized header.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    names: Vec<String>,
}

impl ColumnMap {
    /// Build from a raw header record.
    pub fn from_header(header: &StringRecord) -> Self {
        Self {
            names: header.iter().map(normalize_column).collect(),
        }
    }

    /// Index of an optional column.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Index of a required column.
    pub fn require(&self, name: &str, source: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| {
            Error::ingestion(format!(
                "{source}: missing column '{name}' (found: {})",
                self.names.join(", ")
            ))
        })
    }
}

/// Trimmed field text, `None` when the column is absent or the field blank.
pub fn field<'r>(record: &'r StringRecord, index: Option<usize>) -> Option<&'r str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse a finite number.
pub fn parse_number(text: Option<&str>) -> Option<f64> {
    text.and_then(|t| t.parse::<f64>().ok()).filter(|v| v.is_finite())
}
