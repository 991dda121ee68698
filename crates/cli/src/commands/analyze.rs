//! Demand and price analysis tables.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use merit_batch::DemandAnalysis;
use merit_core::Config;

use super::load_demand;

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Rows to keep in ranked tables
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

pub fn run(config: &Config, args: AnalyzeArgs) -> Result<()> {
    let records = load_demand(config)?;
    let stdout = io::stdout();
    write_analysis(&mut stdout.lock(), DemandAnalysis::new(&records), args.top)
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn write_analysis<W: Write>(out: &mut W, analysis: DemandAnalysis<'_>, top: usize) -> Result<()> {
    writeln!(out, "Daily demand extremes")?;
    writeln!(out, "{:<12} {:>6} {:>12} {:>5}", "date", "period", "demand", "type")?;
    for e in analysis.daily_extremes() {
        writeln!(
            out,
            "{:<12} {:>6} {:>12.3} {:>5}",
            e.date.to_string(),
            e.period.number(),
            e.demand,
            e.kind.to_string()
        )?;
    }

    writeln!(out, "\nPeriods most often at daily maximum")?;
    writeln!(out, "{:>6} {:>6}", "period", "count")?;
    for p in analysis.peak_period_frequency(top) {
        writeln!(out, "{:>6} {:>6}", p.period.number(), p.count)?;
    }

    writeln!(out, "\nTime-of-day summary")?;
    writeln!(out, "{:<8} {:>10} {:>12} {:>6}", "bucket", "avg_price", "avg_demand", "count")?;
    for s in analysis.time_of_day_summary() {
        writeln!(
            out,
            "{:<8} {:>10} {:>12.3} {:>6}",
            s.time_of_day.to_string(),
            optional(s.avg_price),
            s.avg_demand,
            s.observations
        )?;
    }

    writeln!(out, "\nDaily peak demand")?;
    writeln!(out, "{:<12} {:>6} {:>6} {:>12} {:>10}", "date", "period", "start", "demand", "usep")?;
    for p in analysis.daily_peaks() {
        writeln!(
            out,
            "{:<12} {:>6} {:>6} {:>12.3} {:>10}",
            p.date.to_string(),
            p.period.number(),
            p.period.start_time().format("%H:%M").to_string(),
            p.demand,
            optional(p.usep)
        )?;
    }

    writeln!(out, "\nPrice volatility")?;
    writeln!(out, "{:<12} {:>10} {:>10} {:>10}", "date", "std_dev", "range", "relative")?;
    for v in analysis.price_volatility(top) {
        writeln!(
            out,
            "{:<12} {:>10} {:>10.2} {:>10}",
            v.date.to_string(),
            optional(v.std_dev),
            v.range,
            optional(v.relative)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::{Demand, DemandRecord, PeriodKey, SettlementPeriod};

    #[test]
    fn test_sections_present() {
        let date = chrono::NaiveDate::from_ymd_opt(2023, 1, 9).unwrap();
        let records: Vec<DemandRecord> = [(29, 6925.352, 1100.75), (9, 5100.0, 90.0)]
            .into_iter()
            .map(|(period, demand, usep)| DemandRecord {
                key: PeriodKey::new(date, SettlementPeriod::new(period).unwrap()),
                information_type: None,
                demand: Demand::new(demand).unwrap(),
                usep: Some(usep),
                lcp: None,
                tcl: None,
            })
            .collect();

        let mut out = Vec::new();
        write_analysis(&mut out, DemandAnalysis::new(&records), 10).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Daily demand extremes"));
        assert!(text.contains("Price volatility"));
        assert!(text.contains("2023-01-09"));
        assert!(text.contains("1100.75"));
        assert!(text.contains("MAX"));
        // period 29 starts at 14:00
        assert!(text.contains("14:00"));
    }
}
