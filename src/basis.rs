pub use self::calculator::GainCalculator;
pub use self::engine::{CostBasisResult, Engine, EngineConfig, Period};
pub use self::inventory::{InventorySnapshot, LotInventory};
pub use self::lot::{Lot, LotId};
pub use self::matcher::{select_lots, LotMatch, Method};
pub use self::replay::{replay, PortfolioState};

mod calculator;
pub(crate) mod engine;
pub(crate) mod inventory;
mod lot;
pub(crate) mod matcher;
pub(crate) mod replay;
