//! Bid stack inspection.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use merit_clearing::BidStack;
use merit_core::{Config, PeriodKey};

use super::{load_book, period_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StackFormat {
    Table,
    Csv,
    Json,
}

/// Arguments for the stack command
#[derive(Args, Debug)]
pub struct StackArgs {
    /// Trading date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,

    /// Settlement period (1-48)
    #[arg(long, allow_hyphen_values = true)]
    pub period: i64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = StackFormat::Table)]
    pub format: StackFormat,

    /// Print the (cumulative volume, price) step curve instead of full rows
    #[arg(long)]
    pub curve: bool,
}

pub fn run(config: &Config, args: StackArgs) -> Result<()> {
    let key = period_key(config, &args.date, args.period)?;
    let book = load_book(config)?;
    let stack = book.stack(&key).with_context(|| format!("building stack for {key}"))?;

    let stdout = io::stdout();
    write_stack(&mut stdout.lock(), &key, &stack, args.format, args.curve)
}

fn write_stack<W: Write>(
    out: &mut W,
    key: &PeriodKey,
    stack: &BidStack,
    format: StackFormat,
    curve: bool,
) -> Result<()> {
    if format == StackFormat::Table {
        writeln!(out, "{key} (from {})", key.start_datetime().format("%Y-%m-%d %H:%M"))?;
    }

    match (format, curve) {
        (StackFormat::Table, false) => {
            writeln!(out, "{:>5} {:>12} {:>12} {:>14}", "rank", "price", "volume", "cumulative")?;
            for (rank, row) in stack.rows().iter().enumerate() {
                writeln!(
                    out,
                    "{:>5} {:>12.2} {:>12.3} {:>14.3}",
                    rank + 1,
                    row.price,
                    row.volume,
                    row.cumulative_volume
                )?;
            }
            writeln!(out, "max volume: {:.3}", stack.max_volume())?;
        }
        (StackFormat::Table, true) => {
            writeln!(out, "{:>14} {:>12}", "cumulative", "price")?;
            for point in stack.step_curve() {
                writeln!(out, "{:>14.3} {:>12.2}", point.cumulative_volume, point.price)?;
            }
        }
        (StackFormat::Csv, false) => {
            let mut wtr = csv::Writer::from_writer(out);
            for row in stack.rows() {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        (StackFormat::Csv, true) => {
            let mut wtr = csv::Writer::from_writer(out);
            for point in stack.step_curve() {
                wtr.serialize(point)?;
            }
            wtr.flush()?;
        }
        (StackFormat::Json, false) => {
            serde_json::to_writer_pretty(&mut *out, stack)?;
            writeln!(out)?;
        }
        (StackFormat::Json, true) => {
            serde_json::to_writer_pretty(&mut *out, &stack.step_curve())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_clearing::build_stack;
    use merit_core::{Bid, SettlementPeriod};

    fn stack() -> BidStack {
        build_stack(&[Bid::new(30.0, 100.0), Bid::new(10.0, 50.0), Bid::new(20.0, 50.0)]).unwrap()
    }

    fn render(format: StackFormat, curve: bool) -> String {
        let mut out = Vec::new();
        let key = PeriodKey::new(
            chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            SettlementPeriod::new(3).unwrap(),
        );
        write_stack(&mut out, &key, &stack(), format, curve).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_rows() {
        let text = render(StackFormat::Csv, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "price,volume,cumulative_volume,input_index");
        assert_eq!(lines[1], "10.0,50.0,50.0,1");
        assert_eq!(lines[3], "30.0,100.0,200.0,0");
    }

    #[test]
    fn test_curve_json() {
        let value: serde_json::Value = serde_json::from_str(&render(StackFormat::Json, true)).unwrap();
        assert_eq!(value[1]["cumulative_volume"], 100.0);
        assert_eq!(value[1]["price"], 20.0);
    }

    #[test]
    fn test_table_ends_with_capacity() {
        let text = render(StackFormat::Table, false);
        assert_eq!(text.lines().next(), Some("2023-01-01 period 3 (from 2023-01-01 01:00)"));
        assert_eq!(text.lines().count(), 6);
        assert!(text.ends_with("max volume: 200.000\n"));
    }
}
