pub use self::amount::{Sats, UsdCents};
pub use self::exchange_rate::{HistoricalPrices, PriceLookup};
pub use self::gains::{GainLossRecord, GainTerm, GainTotals, HoldingPeriodRule};
pub use self::ledger::{LedgerEvent, PriceMode, TransactionLedger, TxRecord, TxType};
pub use self::report::{TaxDisposition, TaxExport, TaxReport};
pub use self::stats::Stats;
pub use self::summary::PortfolioSummary;

pub(crate) mod amount;
pub mod constants;
pub(crate) mod exchange_rate;
pub(crate) mod gains;
pub mod ledger;
pub(crate) mod report;
pub(crate) mod stats;
pub(crate) mod summary;
