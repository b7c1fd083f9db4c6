use crate::basis::lot::{Lot, LotId};
use crate::model::amount::{Sats, UsdCents};
use crate::util::fixed::OverflowError;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum InventoryError {
    #[error("Lot {0} is already in the inventory")]
    DuplicateLot(LotId),

    #[error("Lot {0} is not open")]
    UnknownLot(LotId),

    #[error("Lot {0} has no open quantity")]
    EmptyLot(LotId),

    #[error("Lot {id} remaining quantity {remaining} exceeds original {original}")]
    InvalidLot {
        id: LotId,
        remaining: Sats,
        original: Sats,
    },

    #[error("Consumed amount must be positive for lot {0}")]
    ZeroAmount(LotId),

    #[error("Cannot consume {requested} BTC from lot {id}, only {available} BTC remains")]
    Overdraw {
        id: LotId,
        requested: Sats,
        available: Sats,
    },

    #[error("Inventory balance overflow")]
    Overflow(#[from] OverflowError),
}

/// Lots are ordered by acquisition time, then ledger sequence.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct LotKey {
    acquisition_date: DateTime<Utc>,
    id: LotId,
}

impl From<&Lot> for LotKey {
    fn from(lot: &Lot) -> Self {
        Self {
            acquisition_date: lot.acquisition_date,
            id: lot.id,
        }
    }
}

/// The open lots of one portfolio.
#[derive(Clone, Debug, Default)]
pub struct LotInventory {
    lots: BTreeMap<LotKey, Lot>,
    by_cost: BTreeSet<(Reverse<UsdCents>, LotKey)>,
    index: HashMap<LotId, LotKey>,
    balance: Sats,
}

/// Immutable view of a [`LotInventory`].
#[derive(Copy, Clone, Debug)]
pub struct InventorySnapshot<'a> {
    inventory: &'a LotInventory,
}

impl LotInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lot(&mut self, lot: Lot) -> Result<(), InventoryError> {
        if self.index.contains_key(&lot.id) {
            return Err(InventoryError::DuplicateLot(lot.id));
        }
        if lot.remaining_quantity_sat > lot.original_quantity_sat {
            return Err(InventoryError::InvalidLot {
                id: lot.id,
                remaining: lot.remaining_quantity_sat,
                original: lot.original_quantity_sat,
            });
        }
        if lot.remaining_quantity_sat.is_zero() {
            return Err(InventoryError::EmptyLot(lot.id));
        }

        self.balance = self.balance.checked_add(lot.remaining_quantity_sat)?;

        let key = LotKey::from(&lot);
        self.index.insert(lot.id, key);
        self.by_cost.insert((Reverse(lot.unit_cost_usd_cents), key));
        self.lots.insert(key, lot);

        Ok(())
    }

    /// Take `amount` sats from a lot, returning the lot as it stands afterwards.
    ///
    /// The lot leaves the inventory once its remaining quantity reaches zero.
    pub fn consume(&mut self, id: LotId, amount: Sats) -> Result<Lot, InventoryError> {
        let key = *self.index.get(&id).ok_or(InventoryError::UnknownLot(id))?;
        let lot = self
            .lots
            .get_mut(&key)
            .ok_or(InventoryError::UnknownLot(id))?;

        if amount.is_zero() {
            return Err(InventoryError::ZeroAmount(id));
        }
        let available = lot.remaining_quantity_sat;
        lot.remaining_quantity_sat =
            available
                .checked_sub(amount)
                .map_err(|_| InventoryError::Overdraw {
                    id,
                    requested: amount,
                    available,
                })?;
        self.balance = self.balance.checked_sub(amount)?;

        if lot.remaining_quantity_sat.is_zero() {
            let lot = self
                .lots
                .remove(&key)
                .ok_or(InventoryError::UnknownLot(id))?;
            self.by_cost.remove(&(Reverse(lot.unit_cost_usd_cents), key));
            self.index.remove(&id);

            Ok(lot)
        } else {
            Ok(lot.clone())
        }
    }

    pub fn snapshot(&self) -> InventorySnapshot<'_> {
        InventorySnapshot { inventory: self }
    }

    pub fn balance(&self) -> Sats {
        self.balance
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

impl<'a> InventorySnapshot<'a> {
    pub fn balance(self) -> Sats {
        self.inventory.balance
    }

    pub fn len(self) -> usize {
        self.inventory.lots.len()
    }

    pub fn is_empty(self) -> bool {
        self.inventory.lots.is_empty()
    }

    pub fn get(self, id: LotId) -> Option<&'a Lot> {
        let key = self.inventory.index.get(&id)?;

        self.inventory.lots.get(key)
    }

    /// Open lots by acquisition time, then ledger sequence.
    pub fn oldest_first(self) -> impl DoubleEndedIterator<Item = &'a Lot> + 'a {
        self.inventory.lots.values()
    }

    /// Open lots by descending unit cost; equal costs oldest first.
    pub fn highest_cost_first(self) -> impl Iterator<Item = &'a Lot> + 'a {
        let lots = &self.inventory.lots;

        self.inventory
            .by_cost
            .iter()
            .filter_map(move |(_, key)| lots.get(key))
    }

    /// Cost basis carried by all open lots.
    pub fn cost_basis(self) -> Result<UsdCents, OverflowError> {
        self.oldest_first()
            .try_fold(UsdCents::ZERO, |acc, lot| {
                acc.checked_add(lot.remaining_cost_basis()?)
            })
    }

    pub fn to_vec(self) -> Vec<Lot> {
        self.oldest_first().cloned().collect()
    }
}
