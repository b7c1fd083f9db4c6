use crate::model::amount::UsdCents;
use chrono::NaiveDate;
use std::{collections::BTreeMap, ffi::OsStr, fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

/// The only quote currency the price DB carries.
pub const USD: &str = "usd";

/// Price lookup failures.
#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum ExchangeRateError {
    #[error("No BTC price recorded for {0}")]
    NotFound(NaiveDate),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

#[derive(Debug, Error)]
pub enum PricesDbError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("RON parsing error in {0:?}")]
    Parse(std::path::PathBuf, #[source] ron::de::SpannedError),
}

/// Historical daily price collaborator.
pub trait PriceLookup {
    /// Price of one whole BTC on `date`, quoted in `currency`.
    fn historical_price(&self, date: NaiveDate, currency: &str)
        -> Result<UsdCents, ExchangeRateError>;
}

pub type PriceMap = BTreeMap<NaiveDate, UsdCents>;

/// Daily BTCUSD prices, loaded from `*-btcusd.ron` files.
///
/// Each file holds a map of `"YYYY-MM-DD": "12345.67"` entries. Later files override earlier ones
/// on the same day, in directory listing order.
#[derive(Debug, Default)]
pub struct HistoricalPrices {
    btc: PriceMap,
}

impl HistoricalPrices {
    /// Create a price DB from the given directory path.
    ///
    /// A missing directory yields an empty DB.
    pub fn new<P>(path: P) -> Result<Self, PricesDbError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mut db = Self::default();

        if !path.is_dir() {
            warn!("Price DB directory {path:?} does not exist");

            return Ok(db);
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            let path = entry?.path();

            if path.is_file() && path.extension() == Some(OsStr::new("ron")) {
                let is_btcusd = path
                    .file_stem()
                    .and_then(OsStr::to_str)
                    .is_some_and(|name| name.ends_with("-btcusd"));

                if is_btcusd {
                    files.push(path);
                }
            }
        }
        files.sort();

        for path in files {
            debug!("Loading prices from {path:?}");
            db.btc.extend(read_ron(&path)?);
        }

        if db.btc.is_empty() {
            warn!("Missing BTCUSD prices");
        }

        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.btc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.btc.is_empty()
    }

    /// The most recent date with a recorded price.
    pub fn latest(&self) -> Option<(NaiveDate, UsdCents)> {
        self.btc.last_key_value().map(|(date, price)| (*date, *price))
    }
}

impl PriceLookup for HistoricalPrices {
    fn historical_price(
        &self,
        date: NaiveDate,
        currency: &str,
    ) -> Result<UsdCents, ExchangeRateError> {
        if !currency.eq_ignore_ascii_case(USD) {
            return Err(ExchangeRateError::UnsupportedCurrency(currency.to_string()));
        }

        self.btc
            .get(&date)
            .copied()
            .ok_or(ExchangeRateError::NotFound(date))
    }
}

impl FromIterator<(NaiveDate, UsdCents)> for HistoricalPrices {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, UsdCents)>,
    {
        Self {
            btc: iter.into_iter().collect(),
        }
    }
}

fn read_ron(path: &Path) -> Result<PriceMap, PricesDbError> {
    let data = fs::read_to_string(path)?;

    ron::from_str::<PriceMap>(&data).map_err(|err| PricesDbError::Parse(path.to_path_buf(), err))
}
