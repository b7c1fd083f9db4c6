use crate::basis::{Method, PortfolioState};
use crate::model::amount::{Sats, UsdCents};
use crate::model::gains::GainTotals;
use crate::util::fixed::OverflowError;
use serde::Serialize;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub method: Method,
    pub total_balance_sat: Sats,
    pub total_cost_basis_usd: UsdCents,
    pub current_price_usd: UsdCents,
    pub current_value_usd: UsdCents,
    pub unrealized_gain_usd: UsdCents,
    pub realized_gain_usd: UsdCents,
    pub total_received_sat: Sats,
    pub total_sent_sat: Sats,
    /// Fees paid on transfers. These stay in `total_balance_sat`.
    pub total_transfer_fee_sat: Sats,
    pub transaction_count: u64,
    pub acquisition_count: u64,
    pub disposal_count: u64,
    pub transfer_count: u64,
    pub open_lot_count: usize,
    pub estimated_count: u64,
}

impl PortfolioSummary {
    /// Roll up a replayed state, marking open lots at `current_price` per BTC.
    pub fn aggregate(
        state: &PortfolioState,
        method: Method,
        current_price: UsdCents,
    ) -> Result<Self, OverflowError> {
        let snapshot = state.inventory.snapshot();
        let total_balance_sat = snapshot.balance();
        let total_cost_basis_usd = snapshot.cost_basis()?;
        let current_value_usd = total_balance_sat.value_at(current_price)?;
        let realized = GainTotals::from_records(&state.gains)?;

        Ok(Self {
            method,
            total_balance_sat,
            total_cost_basis_usd,
            current_price_usd: current_price,
            current_value_usd,
            unrealized_gain_usd: current_value_usd.checked_sub(total_cost_basis_usd)?,
            realized_gain_usd: realized.total,
            total_received_sat: state.stats.total_received(),
            total_sent_sat: state.stats.total_sent(),
            total_transfer_fee_sat: state.stats.total_transfer_fees(),
            transaction_count: state.stats.transaction_count(),
            acquisition_count: state.stats.acquisition_count(),
            disposal_count: state.stats.disposal_count(),
            transfer_count: state.stats.transfer_count(),
            open_lot_count: snapshot.len(),
            estimated_count: state.stats.estimated_count(),
        })
    }
}
