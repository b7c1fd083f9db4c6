#![forbid(unsafe_code)]

use chrono::NaiveDate;
use error_iter::ErrorIter as _;
use lotcount::model::{HistoricalPrices, PriceLookup as _};
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("Date parsing error")]
    Date(#[from] chrono::ParseError),

    #[error("Price DB error")]
    PricesDb(#[from] lotcount::errors::PricesDbError),

    #[error("Price lookup error")]
    ExchangeRate(#[from] lotcount::errors::ExchangeRateError),
}

/// Query the lotcount BTC price DB.
#[derive(Debug, OnlyArgs)]
struct Args {
    /// Quote currency.
    #[default("usd")]
    currency: String,

    /// Lookup date, YYYY-MM-DD. Default is the latest recorded date.
    date: Option<String>,

    /// Path to the price DB.
    #[default("./prices-db/")]
    prices_db: PathBuf,
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_)) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Args = onlyargs::parse()?;

    let db = HistoricalPrices::new(args.prices_db)?;
    println!("entries:\t{}", db.len());

    let date = match args.date {
        Some(date) => date.parse::<NaiveDate>()?,
        None => match db.latest() {
            Some((date, _)) => date,
            None => return Ok(()),
        },
    };
    let price = db.historical_price(date, &args.currency)?;

    println!("date:\t{date}");
    println!("price:\t${price}");

    Ok(())
}
