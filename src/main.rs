#![forbid(unsafe_code)]

use directories::ProjectDirs;
use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use lotcount::basis::{CostBasisResult, Engine, EngineConfig, Method, Period};
use lotcount::errors::{EngineError, ImportError, PricesDbError, UnsupportedMethodError};
use lotcount::imports::transactions::{read_transactions, MemoryStore};
use lotcount::model::ledger::parse_timestamp;
use lotcount::model::{constants, HistoricalPrices, HoldingPeriodRule, PortfolioSummary};
use lotcount::model::{PriceMode, TaxReport, UsdCents};
use onlyargs::CliError;
use onlyargs_derive::OnlyArgs;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::{env, process::ExitCode};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - PRICES_DB overrides the default price DB directory"]
#[footer = "      default is the `prices-db` directory under the user data directory"]
#[footer = "  - RUST_LOG sets the log filter, e.g. `RUST_LOG=lotcount=debug`"]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Read transaction CSV from a file.
    ///   Columns: portfolio_id,id,tx_type,amount_sat,fee_sat,price_usd,transacted_at
    ///
    #[long]
    input_transactions: Vec<PathBuf>,

    /// Portfolio to report on.
    ///   May be omitted when the input holds a single portfolio.
    ///
    #[short('p')]
    portfolio: Option<String>,

    /// Lot matching method: fifo, lifo, or hifo.
    #[short('m')]
    #[default("fifo")]
    method: String,

    /// Tax year to report.
    ///   Writes a Form 8949 CSV when an output path is given.
    ///
    #[short('y')]
    year: Option<i32>,

    /// Replay the ledger only through this timestamp.
    #[long]
    as_of: Option<String>,

    /// Current BTC price in USD for the portfolio summary.
    ///   Default is the most recent price in the price DB.
    ///
    #[long]
    current_price: Option<String>,

    /// Override the price DB directory.
    #[long]
    prices_db: Option<PathBuf>,

    /// Estimate missing prices from the last known price instead of failing.
    #[long]
    lenient: bool,

    /// Use the calendar "more than one year" rule for long-term gains.
    ///   Default is more than 365 days.
    ///
    #[long]
    calendar_year: bool,

    /// Report cost basis under every matching method.
    #[long]
    compare_methods: bool,

    /// Write the Form 8949 CSV to this output directory.
    #[short('o')]
    output_path: Option<PathBuf>,

    /// Enable verbose output.
    /// Prints the Form 8949 CSV to stdout when not written to a file.
    #[short('v')]
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("Failed to import {0:?}")]
    Import(PathBuf, #[source] ImportError),

    #[error("No input transactions, use --input-transactions")]
    NoInput,

    #[error("Select a portfolio with -p, found: {0}")]
    AmbiguousPortfolio(String),

    #[error("Invalid method")]
    Method(#[from] UnsupportedMethodError),

    #[error("Unable to parse --as-of timestamp")]
    AsOf(#[source] chrono::ParseError),

    #[error("Unable to parse --current-price")]
    CurrentPrice(#[source] lotcount::errors::ConvertAmountError),

    #[error("--year and --as-of are mutually exclusive")]
    PeriodConflict,

    #[error("Unable to locate user data directory")]
    DataDir,

    #[error("Unable to load price DB")]
    PricesDb(#[from] PricesDbError),

    #[error("Engine error")]
    Engine(#[from] EngineError),

    #[error("Unable to write {0:?}")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

/// Everything printed to stdout, as one JSON document.
#[derive(Debug, Serialize)]
struct Output {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cost_basis: Vec<CostBasisResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PortfolioSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tax_report: Option<TaxReport>,
}

fn main() -> ExitCode {
    // Initialize the tracing subscriber for instrumentation.
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    //
    // See: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/struct.EnvFilter.html#directives
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stderr().is_terminal());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(term_color),
        )
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;

    if args.input_transactions.is_empty() {
        return Err(Error::NoInput);
    }
    let mut store = MemoryStore::default();
    for path in args.input_transactions {
        debug!("Reading transactions from {path:?}");
        let rows = read_transactions(&path).map_err(|err| Error::Import(path, err))?;
        store.extend(rows);
    }

    let portfolio = match args.portfolio {
        Some(portfolio) => portfolio,
        None => {
            let mut portfolios = store.portfolios();
            match (portfolios.next(), portfolios.next()) {
                (Some(portfolio), None) => portfolio.to_string(),
                _ => {
                    let all: Vec<_> = store.portfolios().collect();
                    return Err(Error::AmbiguousPortfolio(all.join(", ")));
                }
            }
        }
    };

    let method: Method = args.method.parse()?;
    let period = match (args.year, args.as_of) {
        (Some(_), Some(_)) => return Err(Error::PeriodConflict),
        (Some(year), None) => Period::TaxYear(year),
        (None, Some(as_of)) => Period::AsOf(parse_timestamp(&as_of).map_err(Error::AsOf)?),
        (None, None) => Period::All,
    };

    let prices_db = args
        .prices_db
        .or_else(|| env::var_os(constants::ENV_PRICES_DB).map(PathBuf::from));
    let prices_db = match prices_db {
        Some(path) => path,
        None => ProjectDirs::from("org", "lotcount", "lotcount")
            .ok_or(Error::DataDir)?
            .data_dir()
            .join(constants::PRICES_DB_DIR),
    };
    let prices = HistoricalPrices::new(&prices_db)?;
    debug!("Loaded {} prices from {prices_db:?}", prices.len());

    let config = EngineConfig {
        price_mode: if args.lenient {
            PriceMode::Lenient
        } else {
            PriceMode::Strict
        },
        holding_period: if args.calendar_year {
            HoldingPeriodRule::CalendarYear
        } else {
            HoldingPeriodRule::Days365
        },
        ..EngineConfig::default()
    };
    let engine = Engine::new(&store, &prices, config);

    let cost_basis = if args.compare_methods {
        engine.compare_methods(&portfolio, period)?
    } else {
        vec![engine.compute_cost_basis(&portfolio, method, period)?]
    };

    if let Some(result) = cost_basis.first() {
        let years: Vec<_> = result.tax_years.iter().map(i32::to_string).collect();
        info!("Disposals in tax years: [{}]", years.join(", "));
    }

    let current_price = match args.current_price {
        Some(price) => Some(price.parse::<UsdCents>().map_err(Error::CurrentPrice)?),
        None => prices.latest().map(|(date, price)| {
            info!("Marking open lots at the {date} price of ${price}");
            price
        }),
    };
    let summary = current_price
        .map(|price| engine.compute_summary(&portfolio, price, method))
        .transpose()?;

    let tax_report = match args.year {
        Some(year) => {
            let export = engine.export_tax_report(&portfolio, year, method)?;

            if let Some(dir) = args.output_path {
                fs::create_dir_all(&dir).map_err(|err| Error::Write(dir.clone(), err))?;
                let path = dir.join(export.report.file_name());
                fs::write(&path, &export.csv).map_err(|err| Error::Write(path.clone(), err))?;
                info!("Wrote {path:?}");
            } else if args.verbose {
                println!("{}", export.csv);
            }

            Some(export.report)
        }
        None => None,
    };

    let output = Output {
        cost_basis,
        summary,
        tax_report,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
