use crate::model::amount::Sats;
use crate::util::fixed::OverflowError;
use serde::Serialize;

/// Counters tallied while replaying a ledger.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Stats {
    n_transactions: u64,
    n_acquisitions: u64,
    n_disposals: u64,
    n_transfers: u64,
    n_estimated_prices: u64,
    received: Sats,
    sent: Sats,
    transfer_fees: Sats,
}

impl Stats {
    pub fn inc_acquisition(&mut self, quantity: Sats) -> Result<(), OverflowError> {
        self.received = self.received.checked_add(quantity)?;
        self.n_acquisitions += 1;
        self.n_transactions += 1;

        Ok(())
    }

    pub fn inc_disposal(&mut self, quantity: Sats) -> Result<(), OverflowError> {
        self.sent = self.sent.checked_add(quantity)?;
        self.n_disposals += 1;
        self.n_transactions += 1;

        Ok(())
    }

    /// Transfer fees are tallied only. They do not leave inventory.
    pub fn inc_transfer(&mut self, fee: Sats) -> Result<(), OverflowError> {
        self.transfer_fees = self.transfer_fees.checked_add(fee)?;
        self.n_transfers += 1;
        self.n_transactions += 1;

        Ok(())
    }

    pub fn inc_estimated(&mut self) {
        self.n_estimated_prices += 1;
    }

    pub fn transaction_count(&self) -> u64 {
        self.n_transactions
    }

    pub fn acquisition_count(&self) -> u64 {
        self.n_acquisitions
    }

    pub fn disposal_count(&self) -> u64 {
        self.n_disposals
    }

    pub fn transfer_count(&self) -> u64 {
        self.n_transfers
    }

    pub fn estimated_count(&self) -> u64 {
        self.n_estimated_prices
    }

    pub fn total_received(&self) -> Sats {
        self.received
    }

    pub fn total_sent(&self) -> Sats {
        self.sent
    }

    pub fn total_transfer_fees(&self) -> Sats {
        self.transfer_fees
    }
}
