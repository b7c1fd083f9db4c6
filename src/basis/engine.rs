use crate::basis::calculator::GainCalculator;
use crate::basis::inventory::InventoryError;
use crate::basis::lot::Lot;
use crate::basis::matcher::{InsufficientInventoryError, Method};
use crate::basis::replay::replay;
use crate::imports::transactions::TransactionStore;
use crate::model::amount::{Sats, UsdCents};
use crate::model::exchange_rate::{PriceLookup, USD};
use crate::model::gains::{GainLossRecord, GainTotals, HoldingPeriodRule};
use crate::model::ledger::{LedgerError, MissingPriceError, PriceMode};
use crate::model::ledger::{TransactionLedger, ValidationError};
use crate::model::report::{ReportError, TaxExport, TaxReport};
use crate::model::stats::Stats;
use crate::model::summary::PortfolioSummary;
use crate::util::fixed::OverflowError;
use crate::util::year_ext::{self, YearsExt as _};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Portfolio `{0}` not found")]
    PortfolioNotFound(String),

    #[error("Invalid transaction")]
    Validation(#[from] ValidationError),

    #[error("Price unavailable")]
    MissingPrice(#[from] MissingPriceError),

    #[error("Disposal {disposal_id} exceeds recorded holdings")]
    InsufficientInventory {
        disposal_id: String,
        #[source]
        source: InsufficientInventoryError,
    },

    #[error("Lot inventory is inconsistent")]
    Inventory(#[from] InventoryError),

    #[error("Arithmetic overflow")]
    Overflow(#[from] OverflowError),

    #[error("Tax year {0} is out of range")]
    InvalidYear(i32),

    #[error("Unable to write tax report")]
    Report(#[from] ReportError),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(err) => Self::Validation(err),
            LedgerError::MissingPrice(err) => Self::MissingPrice(err),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EngineConfig {
    pub price_mode: PriceMode,
    pub holding_period: HoldingPeriodRule,
    /// Quote currency for historical price lookups.
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            price_mode: PriceMode::default(),
            holding_period: HoldingPeriodRule::default(),
            currency: USD.to_string(),
        }
    }
}

/// Which slice of history a cost basis computation covers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// The whole ledger.
    #[default]
    All,

    /// Replay through the end of the year, report gains disposed during it.
    TaxYear(i32),

    /// Replay through the given instant, inclusive.
    AsOf(DateTime<Utc>),
}

impl Period {
    fn cutoff(self) -> Result<Option<DateTime<Utc>>, EngineError> {
        match self {
            Self::All => Ok(None),
            Self::TaxYear(year) => year_ext::end_of_year(year)
                .map(Some)
                .ok_or(EngineError::InvalidYear(year)),
            Self::AsOf(datetime) => Ok(Some(datetime)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CostBasisResult {
    pub method: Method,
    pub period: Period,
    pub gains: Vec<GainLossRecord>,
    pub total_realized_gain_usd: UsdCents,
    pub total_short_term_gain_usd: UsdCents,
    pub total_long_term_gain_usd: UsdCents,
    pub total_proceeds_usd: UsdCents,
    pub total_cost_basis_usd: UsdCents,
    pub remaining_lots: usize,
    pub remaining_balance_sat: Sats,
    pub remaining_cost_basis_usd: UsdCents,
    pub open_lots: Vec<Lot>,
    /// Every tax year with a disposal up to the end of the period.
    pub tax_years: BTreeSet<i32>,
    pub stats: Stats,
}

/// Stateless cost basis engine. Every call replays the store snapshot from genesis.
pub struct Engine<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    prices: &'a P,
    config: EngineConfig,
}

impl<'a, S, P> Engine<'a, S, P>
where
    S: TransactionStore + ?Sized,
    P: PriceLookup + ?Sized,
{
    pub fn new(store: &'a S, prices: &'a P, config: EngineConfig) -> Self {
        Self {
            store,
            prices,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take the portfolio snapshot and normalize it.
    pub fn ledger(&self, portfolio_id: &str) -> Result<TransactionLedger, EngineError> {
        let records = self
            .store
            .snapshot(portfolio_id)
            .ok_or_else(|| EngineError::PortfolioNotFound(portfolio_id.to_string()))?;
        debug!("Portfolio `{portfolio_id}`: {} records", records.len());

        Ok(TransactionLedger::from_records(
            &records,
            self.prices,
            &self.config.currency,
            self.config.price_mode,
        )?)
    }

    pub fn compute_cost_basis(
        &self,
        portfolio_id: &str,
        method: Method,
        period: Period,
    ) -> Result<CostBasisResult, EngineError> {
        let ledger = self.ledger(portfolio_id)?;

        cost_basis(&ledger, method, period, self.calculator())
    }

    /// Cost basis under every matching method, evaluated in parallel over one snapshot.
    pub fn compare_methods(
        &self,
        portfolio_id: &str,
        period: Period,
    ) -> Result<Vec<CostBasisResult>, EngineError> {
        let ledger = self.ledger(portfolio_id)?;
        let calculator = self.calculator();

        Method::ALL
            .par_iter()
            .map(|&method| cost_basis(&ledger, method, period, calculator))
            .collect()
    }

    /// Balances and gains for the whole ledger, marked at `current_price` per BTC.
    ///
    /// `method` decides which lots remain open, and therefore the remaining cost basis.
    pub fn compute_summary(
        &self,
        portfolio_id: &str,
        current_price: UsdCents,
        method: Method,
    ) -> Result<PortfolioSummary, EngineError> {
        let ledger = self.ledger(portfolio_id)?;
        let state = replay(&ledger, method, self.calculator(), None)?;

        Ok(PortfolioSummary::aggregate(&state, method, current_price)?)
    }

    pub fn export_tax_report(
        &self,
        portfolio_id: &str,
        year: i32,
        method: Method,
    ) -> Result<TaxExport, EngineError> {
        let result = self.compute_cost_basis(portfolio_id, method, Period::TaxYear(year))?;
        let report = TaxReport::new(year, method, &result.gains)?;
        let csv = report.to_csv()?;

        Ok(TaxExport { report, csv })
    }

    fn calculator(&self) -> GainCalculator {
        GainCalculator::new(self.config.holding_period)
    }
}

fn cost_basis(
    ledger: &TransactionLedger,
    method: Method,
    period: Period,
    calculator: GainCalculator,
) -> Result<CostBasisResult, EngineError> {
    let state = replay(ledger, method, calculator, period.cutoff()?)?;
    let tax_years = state.gains.years();

    let gains: Vec<_> = match period {
        Period::TaxYear(year) => year_ext::in_year(&state.gains, year).cloned().collect(),
        Period::All | Period::AsOf(_) => state.gains,
    };
    let totals = GainTotals::from_records(&gains)?;
    let snapshot = state.inventory.snapshot();

    Ok(CostBasisResult {
        method,
        period,
        total_realized_gain_usd: totals.total,
        total_short_term_gain_usd: totals.short_term,
        total_long_term_gain_usd: totals.long_term,
        total_proceeds_usd: totals.proceeds,
        total_cost_basis_usd: totals.cost_basis,
        remaining_lots: snapshot.len(),
        remaining_balance_sat: snapshot.balance(),
        remaining_cost_basis_usd: snapshot.cost_basis()?,
        open_lots: snapshot.to_vec(),
        tax_years,
        stats: state.stats,
        gains,
    })
}
