//! Single-period clearing price.

use anyhow::{Context, Result};
use clap::Args;
use merit_clearing::clearing_price;
use merit_core::{Config, Demand};

use super::{load_book, period_key};

/// Arguments for the price command
#[derive(Args, Debug)]
pub struct PriceArgs {
    /// Trading date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,

    /// Settlement period (1-48)
    #[arg(long, allow_hyphen_values = true)]
    pub period: i64,

    /// Demand to clear (non-negative)
    #[arg(long, allow_hyphen_values = true)]
    pub demand: String,
}

pub fn run(config: &Config, args: PriceArgs) -> Result<()> {
    // reject bad input before touching any data
    let key = period_key(config, &args.date, args.period)?;
    let demand = Demand::parse(&args.demand)?;

    let book = load_book(config)?;
    let price = clearing_price(&book, &key, demand).with_context(|| format!("clearing {key}"))?;

    println!("{}", render(demand, price));
    Ok(())
}

fn render(demand: Demand, price: f64) -> String {
    format!(
        "based on the demand {:?}, final clearing price is {:?}",
        demand.value(),
        price
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let demand = Demand::new(150.0).unwrap();
        assert_eq!(
            render(demand, 20.0),
            "based on the demand 150.0, final clearing price is 20.0"
        );
        assert_eq!(
            render(Demand::new(3.25).unwrap(), -4999.5),
            "based on the demand 3.25, final clearing price is -4999.5"
        );
    }
}
