use crate::model::amount::{Sats, UsdCents};
use crate::model::ledger::Acquisition;
use crate::util::fixed::{self, OverflowError, SATS_PER_BTC};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lot identity; the ledger sequence of the acquisition that opened it.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct LotId(pub u64);

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lot-{}", self.0)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Lot {
    pub id: LotId,
    pub acquisition_date: DateTime<Utc>,
    pub original_quantity_sat: Sats,
    pub remaining_quantity_sat: Sats,
    /// Cents per whole BTC.
    #[serde(rename = "unit_cost_usd")]
    pub unit_cost_usd_cents: UsdCents,
    pub source_transaction_id: String,
    pub estimated: bool,
}

impl Lot {
    pub fn consumed(&self) -> Sats {
        Sats::from_sat(
            self.original_quantity_sat
                .to_sat()
                .saturating_sub(self.remaining_quantity_sat.to_sat()),
        )
    }

    /// Cost of the next `amount` sats consumed from this lot.
    ///
    /// Rounding is applied to the cumulative consumed quantity, so the costs of every consumption
    /// sum to the cost of the whole lot.
    pub fn cost_of(&self, amount: Sats) -> Result<UsdCents, OverflowError> {
        let before = i128::from(self.consumed().to_sat());
        let after = before + i128::from(amount.to_sat());

        self.cumulative_cost(after)?
            .checked_sub(self.cumulative_cost(before)?)
    }

    /// Cost basis still carried by the open remainder.
    pub fn remaining_cost_basis(&self) -> Result<UsdCents, OverflowError> {
        let original = i128::from(self.original_quantity_sat.to_sat());
        let consumed = i128::from(self.consumed().to_sat());

        self.cumulative_cost(original)?
            .checked_sub(self.cumulative_cost(consumed)?)
    }

    fn cumulative_cost(&self, sats: i128) -> Result<UsdCents, OverflowError> {
        let cost = fixed::mul_div_round(
            sats,
            i128::from(self.unit_cost_usd_cents.cents()),
            SATS_PER_BTC,
            "lot cost basis",
        )?;

        fixed::narrow(cost, "lot cost basis").map(UsdCents::from_cents)
    }
}

impl From<&Acquisition> for Lot {
    fn from(acquisition: &Acquisition) -> Self {
        Self {
            id: LotId(acquisition.header.sequence),
            acquisition_date: acquisition.header.date,
            original_quantity_sat: acquisition.quantity,
            remaining_quantity_sat: acquisition.quantity,
            unit_cost_usd_cents: acquisition.unit_cost,
            source_transaction_id: acquisition.header.id.clone(),
            estimated: acquisition.estimated,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone as _;

    pub(crate) fn lot(id: u64, date: (i32, u32, u32), sats: u64, unit_cost: i64) -> Lot {
        Lot {
            id: LotId(id),
            acquisition_date: Utc.with_ymd_and_hms(date.0, date.1, date.2, 0, 0, 0).unwrap(),
            original_quantity_sat: Sats::from_sat(sats),
            remaining_quantity_sat: Sats::from_sat(sats),
            unit_cost_usd_cents: UsdCents::from_cents(unit_cost),
            source_transaction_id: format!("tx-{id}"),
            estimated: false,
        }
    }

    #[test]
    fn test_partial_costs_sum_to_whole() {
        // 3 sats at $0.50/BTC is 1.5 cents, each sat alone is half a cent.
        let mut lot = lot(0, (2023, 1, 1), 3, 50_000_000);
        let whole = lot.remaining_cost_basis().unwrap();
        assert_eq!(whole, UsdCents::from_cents(2));

        let mut total = UsdCents::ZERO;
        for _ in 0..3 {
            let cost = lot.cost_of(Sats::from_sat(1)).unwrap();
            total = total.checked_add(cost).unwrap();
            lot.remaining_quantity_sat = lot
                .remaining_quantity_sat
                .checked_sub(Sats::from_sat(1))
                .unwrap();
        }

        assert_eq!(total, whole);
        assert_eq!(lot.remaining_cost_basis().unwrap(), UsdCents::ZERO);
    }

    #[test]
    fn test_partial_consumption_keeps_unit_cost() {
        let mut lot = lot(1, (2023, 6, 1), 50_000, 2_500_000);

        assert_eq!(lot.cost_of(Sats::from_sat(20_000)), Ok(UsdCents::from_cents(500)));
        lot.remaining_quantity_sat = Sats::from_sat(30_000);

        assert_eq!(lot.unit_cost_usd_cents, UsdCents::from_cents(2_500_000));
        assert_eq!(lot.consumed(), Sats::from_sat(20_000));
        assert_eq!(lot.remaining_cost_basis(), Ok(UsdCents::from_cents(750)));
    }
}
