use crate::basis::matcher::LotMatch;
use crate::model::amount::UsdCents;
use crate::model::gains::{GainLossRecord, HoldingPeriodRule};
use crate::model::ledger::Disposal;
use crate::util::fixed::{self, OverflowError, SATS_PER_BTC};

/// Turns matched lots into realized gain records.
///
/// Gross proceeds and the fee are split across the matched lots in proportion to the sats each
/// lot contributes. Every split is the difference of two rounded cumulative amounts, so the shares
/// of one disposal always add up to the disposal's own rounded totals.
#[derive(Copy, Clone, Debug, Default)]
pub struct GainCalculator {
    rule: HoldingPeriodRule,
}

/// Cumulative proceeds of one disposal, indexed by sats consumed so far.
struct DisposalShares {
    quantity: i128,
    price: i128,
    fee: i128,
}

impl DisposalShares {
    fn new(disposal: &Disposal) -> Self {
        Self {
            quantity: i128::from(disposal.quantity.to_sat()),
            price: i128::from(disposal.unit_price.cents()),
            fee: i128::from(disposal.fee.to_sat()),
        }
    }

    fn gross(&self, consumed: i128) -> Result<i128, OverflowError> {
        fixed::mul_div_round(consumed, self.price, SATS_PER_BTC, "disposal proceeds")
    }

    fn fee(&self, consumed: i128) -> Result<i128, OverflowError> {
        let den = self
            .quantity
            .checked_mul(SATS_PER_BTC)
            .ok_or(OverflowError("fee allocation"))?;

        fixed::mul3_div_round(consumed, self.fee, self.price, den, "fee allocation")
    }
}

impl GainCalculator {
    pub fn new(rule: HoldingPeriodRule) -> Self {
        Self { rule }
    }

    /// One record per matched lot, in match order.
    pub fn realize(
        &self,
        disposal: &Disposal,
        matches: &[LotMatch<'_>],
    ) -> Result<Vec<GainLossRecord>, OverflowError> {
        let shares = DisposalShares::new(disposal);
        let mut consumed = 0_i128;
        let mut gross_before = 0_i128;
        let mut fee_before = 0_i128;

        matches
            .iter()
            .map(|LotMatch { lot, amount }| -> Result<GainLossRecord, OverflowError> {
                consumed += i128::from(amount.to_sat());
                let gross_after = shares.gross(consumed)?;
                let fee_after = shares.fee(consumed)?;

                let gross = gross_after - gross_before;
                let fee = fee_after - fee_before;
                gross_before = gross_after;
                fee_before = fee_after;

                let proceeds = fixed::narrow(gross - fee, "proceeds").map(UsdCents::from_cents)?;
                let fee = fixed::narrow(fee, "fee allocation").map(UsdCents::from_cents)?;
                let cost_basis = lot.cost_of(*amount)?;
                let gain = proceeds.checked_sub(cost_basis)?;
                let (holding_days, term) =
                    self.rule.classify(lot.acquisition_date, disposal.header.date);

                Ok(GainLossRecord {
                    lot_id: lot.id,
                    disposal_id: disposal.header.id.clone(),
                    quantity_consumed_sat: *amount,
                    acquisition_date: lot.acquisition_date,
                    disposal_date: disposal.header.date,
                    cost_basis_usd_cents: cost_basis,
                    proceeds_usd_cents: proceeds,
                    fee_usd_cents: fee,
                    gain_usd_cents: gain,
                    holding_days,
                    term,
                    estimated: disposal.estimated || lot.estimated,
                })
            })
            .collect()
    }
}
