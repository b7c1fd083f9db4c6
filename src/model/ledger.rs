//! Raw transaction records and their normalized, ordered event stream.

use crate::model::amount::{ConvertAmountError, Sats, UsdCents};
use crate::model::exchange_rate::{ExchangeRateError, PriceLookup};
use crate::util::year_ext::GetYear;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Transaction {id}: unknown transaction type `{tx_type}`")]
    UnknownType { id: String, tx_type: String },

    #[error("Transaction {id}: amount must be positive, found {amount}")]
    NonPositiveAmount { id: String, amount: i64 },

    #[error("Transaction {id}: fee must not be negative, found {fee}")]
    NegativeFee { id: String, fee: i64 },

    #[error("Transaction {id}: fee {fee} exceeds the disposed amount {amount}")]
    FeeExceedsAmount { id: String, fee: u64, amount: u64 },

    #[error("Transaction {id}: price must not be negative, found {price}")]
    NegativePrice { id: String, price: UsdCents },

    #[error("Transaction {id}: unable to parse price")]
    Price {
        id: String,
        #[source]
        source: ConvertAmountError,
    },

    #[error("Transaction {id}: unable to parse timestamp `{value}`")]
    Timestamp {
        id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug, Error)]
#[error("Transaction {id}: no price recorded and no historical price for {date}")]
pub struct MissingPriceError {
    pub id: String,
    pub date: NaiveDate,
    #[source]
    pub source: ExchangeRateError,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger validation error")]
    Validation(#[from] ValidationError),

    #[error("Missing price")]
    MissingPrice(#[from] MissingPriceError),
}

/// One transaction as supplied by the transaction store.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TxRecord {
    pub id: String,
    pub tx_type: String,
    pub amount_sat: i64,
    #[serde(default)]
    pub fee_sat: Option<i64>,
    #[serde(default)]
    pub price_usd: Option<Decimal>,
    pub transacted_at: String,
}

impl TxRecord {
    pub fn new(
        id: impl Into<String>,
        tx_type: impl Into<String>,
        amount_sat: i64,
        transacted_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tx_type: tx_type.into(),
            amount_sat,
            fee_sat: None,
            price_usd: None,
            transacted_at: transacted_at.into(),
        }
    }

    pub fn with_fee(mut self, fee_sat: i64) -> Self {
        self.fee_sat = Some(fee_sat);
        self
    }

    pub fn with_price(mut self, price_usd: Decimal) -> Self {
        self.price_usd = Some(price_usd);
        self
    }
}

/// Closed set of transaction types.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Buy,
    Receive,
    Sell,
    Send,
    Transfer,
}

impl FromStr for TxType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "receive" => Ok(Self::Receive),
            "sell" => Ok(Self::Sell),
            "send" => Ok(Self::Send),
            "transfer" => Ok(Self::Transfer),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buy => "buy",
            Self::Receive => "receive",
            Self::Sell => "sell",
            Self::Send => "send",
            Self::Transfer => "transfer",
        };

        write!(f, "{name}")
    }
}

/// Whether a missing price aborts the computation.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceMode {
    #[default]
    Strict,

    /// Fall back to the last known price and mark the event as estimated.
    Lenient,
}

/// Fields shared by every event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EventHeader {
    /// Position of the record in the store snapshot. Breaks timestamp ties.
    pub sequence: u64,
    pub id: String,
    pub tx_type: TxType,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Acquisition {
    pub header: EventHeader,
    pub quantity: Sats,
    /// Cents per whole BTC.
    pub unit_cost: UsdCents,
    /// Recorded for audit. Acquisition fees are not added to the basis.
    pub fee: Sats,
    pub estimated: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Disposal {
    pub header: EventHeader,
    /// Total sats leaving the portfolio, fee included.
    pub quantity: Sats,
    /// Cents per whole BTC.
    pub unit_price: UsdCents,
    pub fee: Sats,
    pub estimated: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Transfer {
    pub header: EventHeader,
    pub quantity: Sats,
    pub fee: Sats,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerEvent {
    Acquisition(Acquisition),
    Disposal(Disposal),
    Transfer(Transfer),
}

impl LedgerEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            Self::Acquisition(event) => &event.header,
            Self::Disposal(event) => &event.header,
            Self::Transfer(event) => &event.header,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.header().date
    }
}

impl GetYear for LedgerEvent {
    fn get_year(&self) -> i32 {
        self.date().get_year()
    }
}

/// A validated, chronologically ordered event stream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransactionLedger {
    events: Vec<LedgerEvent>,
}

/// A record that passed validation, waiting for its price.
struct Validated {
    header: EventHeader,
    quantity: Sats,
    fee: Sats,
    price: Option<UsdCents>,
}

impl TransactionLedger {
    /// Validate and order raw records, resolving missing prices through `prices`.
    ///
    /// Events are ordered by timestamp, then by their position in `records`.
    pub fn from_records<P>(
        records: &[TxRecord],
        prices: &P,
        currency: &str,
        mode: PriceMode,
    ) -> Result<Self, LedgerError>
    where
        P: PriceLookup + ?Sized,
    {
        let mut ordered = BTreeMap::new();
        for (sequence, record) in (0_u64..).zip(records) {
            let validated = validate(sequence, record)?;
            ordered.insert((validated.header.date, sequence), validated);
        }

        let mut events = Vec::with_capacity(ordered.len());
        let mut last_price = None;

        for validated in ordered.into_values() {
            let Validated {
                header,
                quantity,
                fee,
                price,
            } = validated;

            let is_acquisition = match header.tx_type {
                TxType::Buy | TxType::Receive => true,
                TxType::Sell | TxType::Send => false,
                TxType::Transfer => {
                    events.push(LedgerEvent::Transfer(Transfer {
                        header,
                        quantity,
                        fee,
                    }));
                    continue;
                }
            };

            let (price, estimated) = match price {
                Some(price) => (price, false),
                None => match prices.historical_price(header.date.date_naive(), currency) {
                    Ok(price) => (price, false),
                    Err(source) => match mode {
                        PriceMode::Strict => {
                            return Err(MissingPriceError {
                                id: header.id.clone(),
                                date: header.date.date_naive(),
                                source,
                            }
                            .into());
                        }
                        PriceMode::Lenient => {
                            let fallback = last_price.unwrap_or_default();
                            warn!(
                                "Transaction {}: {source}, estimating with ${fallback}",
                                header.id
                            );

                            (fallback, true)
                        }
                    },
                },
            };
            if !estimated {
                last_price = Some(price);
            }

            events.push(if is_acquisition {
                LedgerEvent::Acquisition(Acquisition {
                    header,
                    quantity,
                    unit_cost: price,
                    fee,
                    estimated,
                })
            } else {
                LedgerEvent::Disposal(Disposal {
                    header,
                    quantity,
                    unit_price: price,
                    fee,
                    estimated,
                })
            });
        }

        debug!("Ledger normalized {} events", events.len());

        Ok(Self { events })
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn validate(sequence: u64, record: &TxRecord) -> Result<Validated, ValidationError> {
    let id = || record.id.clone();

    let tx_type = record
        .tx_type
        .parse::<TxType>()
        .map_err(|_| ValidationError::UnknownType {
            id: id(),
            tx_type: record.tx_type.clone(),
        })?;

    let quantity = u64::try_from(record.amount_sat)
        .ok()
        .filter(|amount| *amount > 0)
        .map(Sats::from_sat)
        .ok_or_else(|| ValidationError::NonPositiveAmount {
            id: id(),
            amount: record.amount_sat,
        })?;

    let fee_sat = record.fee_sat.unwrap_or(0);
    let fee = u64::try_from(fee_sat)
        .map(Sats::from_sat)
        .map_err(|_| ValidationError::NegativeFee {
            id: id(),
            fee: fee_sat,
        })?;
    if matches!(tx_type, TxType::Sell | TxType::Send) && fee > quantity {
        return Err(ValidationError::FeeExceedsAmount {
            id: id(),
            fee: fee.to_sat(),
            amount: quantity.to_sat(),
        });
    }

    let price = record
        .price_usd
        .map(UsdCents::try_from)
        .transpose()
        .map_err(|source| ValidationError::Price { id: id(), source })?;
    if let Some(price) = price.filter(|price| price.is_negative()) {
        return Err(ValidationError::NegativePrice { id: id(), price });
    }

    let date = parse_timestamp(&record.transacted_at).map_err(|source| {
        ValidationError::Timestamp {
            id: id(),
            value: record.transacted_at.clone(),
            source,
        }
    })?;

    Ok(Validated {
        header: EventHeader {
            sequence,
            id: id(),
            tx_type,
            date,
        },
        quantity,
        fee,
        price,
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare `YYYY-MM-DD`.
///
/// Timestamps without an offset are UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Ok(datetime.with_timezone(&Utc));
    }
    for format in ["%F %T", "%FT%T"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(datetime.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%F").map(|date| date.and_time(NaiveTime::MIN).and_utc())
}
