pub use crate::basis::engine::EngineError;
pub use crate::basis::inventory::InventoryError;
pub use crate::basis::matcher::{InsufficientInventoryError, UnsupportedMethodError};
pub use crate::imports::transactions::ImportError;
pub use crate::model::amount::ConvertAmountError;
pub use crate::model::exchange_rate::{ExchangeRateError, PricesDbError};
pub use crate::model::ledger::{LedgerError, MissingPriceError, ValidationError};
pub use crate::model::report::ReportError;
pub use crate::util::fixed::OverflowError;
