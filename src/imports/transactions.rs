use crate::model::ledger::TxRecord;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::{io::Read, num::ParseIntError, path::Path, str::FromStr};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV Error")]
    Csv(#[from] csv::Error),

    #[error("Transaction {id}: unable to parse `{field}`")]
    Integer {
        id: String,
        field: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("Transaction {id}: unable to parse `price_usd`")]
    Decimal {
        id: String,
        #[source]
        source: rust_decimal::Error,
    },
}

/// Supplies the transaction log of a portfolio.
pub trait TransactionStore {
    /// A consistent copy of every record in the portfolio, in insertion order.
    ///
    /// Returns `None` for an unknown portfolio.
    fn snapshot(&self, portfolio_id: &str) -> Option<Vec<TxRecord>>;
}

/// In-memory transaction store keyed by portfolio.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    portfolios: BTreeMap<String, Vec<TxRecord>>,
}

impl MemoryStore {
    pub fn insert(&mut self, portfolio_id: impl Into<String>, record: TxRecord) {
        self.portfolios
            .entry(portfolio_id.into())
            .or_default()
            .push(record);
    }

    pub fn portfolios(&self) -> impl Iterator<Item = &str> {
        self.portfolios.keys().map(String::as_str)
    }
}

impl TransactionStore for MemoryStore {
    fn snapshot(&self, portfolio_id: &str) -> Option<Vec<TxRecord>> {
        self.portfolios.get(portfolio_id).cloned()
    }
}

impl Extend<(String, TxRecord)> for MemoryStore {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (String, TxRecord)>,
    {
        for (portfolio_id, record) in iter {
            self.insert(portfolio_id, record);
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TransactionCSVRow {
    pub(crate) portfolio_id: String,
    pub(crate) id: String,
    pub(crate) tx_type: String,
    pub(crate) amount_sat: String,
    pub(crate) fee_sat: String,
    pub(crate) price_usd: String,
    pub(crate) transacted_at: String,
}

/// Read `portfolio_id,id,tx_type,amount_sat,fee_sat,price_usd,transacted_at` rows from a file.
///
/// Lines starting with `#` are comments. Empty `fee_sat` and `price_usd` cells mean "absent".
pub fn read_transactions(path: impl AsRef<Path>) -> Result<Vec<(String, TxRecord)>, ImportError> {
    let reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;

    parse_rows(reader)
}

/// Like [`read_transactions`], from any reader.
pub fn read_transactions_from<R: Read>(rdr: R) -> Result<Vec<(String, TxRecord)>, ImportError> {
    let reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(rdr);

    parse_rows(reader)
}

fn parse_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<(String, TxRecord)>, ImportError> {
    let mut rows = Vec::new();

    debug!("Parsing transaction rows");
    for result in reader.deserialize() {
        let record: TransactionCSVRow = result?;
        debug!("Deserialized: {record:?}");

        let portfolio_id = record.portfolio_id.clone();
        let record2 = transaction_parse(record)?;
        debug!("Parsed: {record2:?}");

        rows.push((portfolio_id, record2));
    }

    Ok(rows)
}

fn transaction_parse(row: TransactionCSVRow) -> Result<TxRecord, ImportError> {
    let integer = |field: &'static str, value: &str| {
        value.parse::<i64>().map_err(|source| ImportError::Integer {
            id: row.id.clone(),
            field,
            source,
        })
    };

    let amount_sat = integer("amount_sat", &row.amount_sat)?;
    let fee_sat = match row.fee_sat.as_str() {
        "" => None,
        fee => Some(integer("fee_sat", fee)?),
    };
    let price_usd = match row.price_usd.as_str() {
        "" => None,
        price => Some(
            Decimal::from_str(price).map_err(|source| ImportError::Decimal {
                id: row.id.clone(),
                source,
            })?,
        ),
    };

    Ok(TxRecord {
        id: row.id,
        tx_type: row.tx_type,
        amount_sat,
        fee_sat,
        price_usd,
        transacted_at: row.transacted_at,
    })
}
