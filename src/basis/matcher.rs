use crate::basis::inventory::InventorySnapshot;
use crate::basis::lot::Lot;
use crate::model::amount::Sats;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Eq, PartialEq)]
#[error("Unsupported lot matching method `{0}`, expected one of fifo, lifo, hifo")]
pub struct UnsupportedMethodError(pub String);

#[derive(Debug, Error, Eq, PartialEq)]
#[error("Insufficient inventory: requested {requested} BTC, only {available} BTC is open")]
pub struct InsufficientInventoryError {
    pub requested: Sats,
    pub available: Sats,
}

/// Lot matching strategy.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Oldest acquisition first.
    #[default]
    Fifo,

    /// Newest acquisition first. Identical timestamps take the later ledger entry first.
    Lifo,

    /// Highest unit cost first, ties oldest first.
    Hifo,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Fifo, Method::Lifo, Method::Hifo];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Lifo => "lifo",
            Self::Hifo => "hifo",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnsupportedMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            "hifo" => Ok(Self::Hifo),
            _ => Err(UnsupportedMethodError(s.to_string())),
        }
    }
}

/// A lot selected for a disposal and the amount taken from it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LotMatch<'a> {
    pub lot: &'a Lot,
    pub amount: Sats,
}

/// Choose lots to cover `quantity` sats.
///
/// The amounts sum exactly to `quantity`. Nothing is selected when open inventory falls short.
pub fn select_lots<'a>(
    quantity: Sats,
    snapshot: InventorySnapshot<'a>,
    method: Method,
) -> Result<Vec<LotMatch<'a>>, InsufficientInventoryError> {
    let available = snapshot.balance();
    if available < quantity {
        return Err(InsufficientInventoryError {
            requested: quantity,
            available,
        });
    }

    let lots: Box<dyn Iterator<Item = &'a Lot> + 'a> = match method {
        Method::Fifo => Box::new(snapshot.oldest_first()),
        Method::Lifo => Box::new(snapshot.oldest_first().rev()),
        Method::Hifo => Box::new(snapshot.highest_cost_first()),
    };

    let mut needed = quantity.to_sat();
    let mut matches = Vec::new();
    for lot in lots {
        if needed == 0 {
            break;
        }

        let amount = needed.min(lot.remaining_quantity_sat.to_sat());
        needed -= amount;
        trace!("{method}: take {amount} sats from {}", lot.id);

        matches.push(LotMatch {
            lot,
            amount: Sats::from_sat(amount),
        });
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::inventory::LotInventory;
    use crate::basis::lot::tests::lot;
    use similar_asserts::assert_eq;

    fn picks(matches: &[LotMatch<'_>]) -> Vec<(u64, u64)> {
        matches
            .iter()
            .map(|m| (m.lot.id.0, m.amount.to_sat()))
            .collect()
    }

    // Non-monotonic costs: the middle lot is the most expensive.
    fn inventory() -> LotInventory {
        let mut inventory = LotInventory::new();
        inventory.add_lot(lot(0, (2023, 1, 1), 40_000, 2_000_000)).unwrap();
        inventory.add_lot(lot(1, (2023, 3, 1), 40_000, 4_000_000)).unwrap();
        inventory.add_lot(lot(2, (2023, 5, 1), 40_000, 3_000_000)).unwrap();
        inventory
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("fifo".parse::<Method>(), Ok(Method::Fifo));
        assert_eq!("LIFO".parse::<Method>(), Ok(Method::Lifo));
        assert_eq!(" Hifo ".parse::<Method>(), Ok(Method::Hifo));
        assert_eq!(
            "average".parse::<Method>(),
            Err(UnsupportedMethodError("average".to_string()))
        );
        assert_eq!(serde_json::to_string(&Method::Hifo).unwrap(), r#""hifo""#);
    }

    #[test]
    fn test_strategies() {
        let inventory = inventory();
        let quantity = Sats::from_sat(60_000);

        let fifo = select_lots(quantity, inventory.snapshot(), Method::Fifo).unwrap();
        let lifo = select_lots(quantity, inventory.snapshot(), Method::Lifo).unwrap();
        let hifo = select_lots(quantity, inventory.snapshot(), Method::Hifo).unwrap();

        assert_eq!(picks(&fifo), vec![(0, 40_000), (1, 20_000)]);
        assert_eq!(picks(&lifo), vec![(2, 40_000), (1, 20_000)]);
        assert_eq!(picks(&hifo), vec![(1, 40_000), (2, 20_000)]);
    }

    #[test]
    fn test_ties() {
        let mut inventory = LotInventory::new();
        inventory.add_lot(lot(0, (2023, 1, 1), 10, 500)).unwrap();
        inventory.add_lot(lot(1, (2023, 1, 1), 10, 500)).unwrap();
        inventory.add_lot(lot(2, (2023, 2, 1), 10, 500)).unwrap();
        let quantity = Sats::from_sat(15);

        let fifo = select_lots(quantity, inventory.snapshot(), Method::Fifo).unwrap();
        let lifo = select_lots(quantity, inventory.snapshot(), Method::Lifo).unwrap();
        let hifo = select_lots(quantity, inventory.snapshot(), Method::Hifo).unwrap();

        assert_eq!(picks(&fifo), vec![(0, 10), (1, 5)]);
        assert_eq!(picks(&lifo), vec![(2, 10), (1, 5)]);
        assert_eq!(picks(&hifo), vec![(0, 10), (1, 5)]);
    }

    #[test]
    fn test_insufficient_inventory() {
        let inventory = inventory();

        for method in Method::ALL {
            assert_eq!(
                select_lots(Sats::from_sat(120_001), inventory.snapshot(), method),
                Err(InsufficientInventoryError {
                    requested: Sats::from_sat(120_001),
                    available: Sats::from_sat(120_000),
                })
            );
        }

        let all = select_lots(Sats::from_sat(120_000), inventory.snapshot(), Method::Hifo).unwrap();
        assert_eq!(picks(&all), vec![(1, 40_000), (2, 40_000), (0, 40_000)]);
    }
}
