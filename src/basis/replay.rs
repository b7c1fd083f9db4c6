use crate::basis::calculator::GainCalculator;
use crate::basis::inventory::LotInventory;
use crate::basis::lot::{Lot, LotId};
use crate::basis::matcher::{select_lots, Method};
use crate::errors::EngineError;
use crate::model::amount::Sats;
use crate::model::gains::GainLossRecord;
use crate::model::ledger::{LedgerEvent, TransactionLedger};
use crate::model::stats::Stats;
use chrono::{DateTime, Utc};
use tracing::debug;


/// Portfolio state derived from replaying a ledger from genesis.
#[derive(Clone, Debug, Default)]
pub struct PortfolioState {
    /// Lots still open after the last replayed event.
    pub inventory: LotInventory,

    /// Append-only realized gains, in ledger order.
    pub gains: Vec<GainLossRecord>,

    pub stats: Stats,
}

/// Replay every event up to and including `cutoff`.
///
/// Fails on the first disposal that exceeds open inventory; no partial state is returned.
pub fn replay(
    ledger: &TransactionLedger,
    method: Method,
    calculator: GainCalculator,
    cutoff: Option<DateTime<Utc>>,
) -> Result<PortfolioState, EngineError> {
    let mut state = PortfolioState::default();

    for event in ledger.events() {
        if cutoff.is_some_and(|cutoff| event.date() > cutoff) {
            break;
        }

        match event {
            LedgerEvent::Acquisition(acquisition) => {
                debug!(
                    "{}: acquire {} BTC at ${}",
                    acquisition.header.id, acquisition.quantity, acquisition.unit_cost
                );
                state.stats.inc_acquisition(acquisition.quantity)?;
                if acquisition.estimated {
                    state.stats.inc_estimated();
                }

                state.inventory.add_lot(Lot::from(acquisition))?;
            }
            LedgerEvent::Disposal(disposal) => {
                debug!(
                    "{}: dispose {} BTC at ${} with fee {} BTC",
                    disposal.header.id, disposal.quantity, disposal.unit_price, disposal.fee
                );
                state.stats.inc_disposal(disposal.quantity)?;
                if disposal.estimated {
                    state.stats.inc_estimated();
                }

                let (records, picks) = {
                    let matches = select_lots(
                        disposal.quantity,
                        state.inventory.snapshot(),
                        method,
                    )
                    .map_err(|source| EngineError::InsufficientInventory {
                        disposal_id: disposal.header.id.clone(),
                        source,
                    })?;
                    let records = calculator.realize(disposal, &matches)?;
                    let picks: Vec<(LotId, Sats)> =
                        matches.iter().map(|m| (m.lot.id, m.amount)).collect();

                    (records, picks)
                };

                for (id, amount) in picks {
                    state.inventory.consume(id, amount)?;
                }
                state.gains.extend(records);
            }
            LedgerEvent::Transfer(transfer) => {
                // Lots carry over unchanged.
                debug!(
                    "{}: transfer {} BTC, fee {} BTC is not realized",
                    transfer.header.id, transfer.quantity, transfer.fee
                );
                state.stats.inc_transfer(transfer.fee)?;
            }
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InsufficientInventoryError;
    use crate::model::amount::UsdCents;
    use crate::model::exchange_rate::HistoricalPrices;
    use crate::model::gains::{GainTerm, HoldingPeriodRule};
    use crate::model::ledger::{PriceMode, TxRecord};
    use rust_decimal::Decimal;
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    pub(super) fn ledger(records: &[TxRecord]) -> TransactionLedger {
        TransactionLedger::from_records(
            records,
            &HistoricalPrices::default(),
            "usd",
            PriceMode::Strict,
        )
        .unwrap()
    }

    fn usd(dollars: i64) -> Decimal {
        Decimal::from(dollars)
    }

    fn run(records: &[TxRecord], method: Method) -> Result<PortfolioState, EngineError> {
        replay(&ledger(records), method, GainCalculator::default(), None)
    }

    #[test]
    #[traced_test]
    fn test_scenario_single_lot() {
        let _ = tracing_log::LogTracer::init();

        let records = [
            TxRecord::new("buy", "buy", 100_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("sell", "sell", 100_000, "2024-06-01").with_price(usd(30_000)),
        ];
        let state = run(&records, Method::Fifo).unwrap();

        assert_eq!(state.gains.len(), 1);
        let gain = &state.gains[0];
        assert_eq!(gain.cost_basis_usd_cents, UsdCents::from_cents(2_000));
        assert_eq!(gain.proceeds_usd_cents, UsdCents::from_cents(3_000));
        assert_eq!(gain.gain_usd_cents, UsdCents::from_cents(1_000));
        assert_eq!(gain.holding_days, 517);
        assert_eq!(gain.term, GainTerm::Long);
        assert!(state.inventory.is_empty());
    }

    #[test]
    fn test_scenario_fifo_partial() {
        let records = [
            TxRecord::new("lot1", "buy", 50_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("lot2", "buy", 50_000, "2023-06-01").with_price(usd(25_000)),
            TxRecord::new("sale", "sell", 70_000, "2023-12-01").with_price(usd(30_000)),
        ];
        let state = run(&records, Method::Fifo).unwrap();

        let consumed: Vec<_> = state
            .gains
            .iter()
            .map(|g| (g.lot_id, g.quantity_consumed_sat.to_sat(), g.cost_basis_usd_cents.cents()))
            .collect();
        assert_eq!(consumed, vec![(LotId(0), 50_000, 1_000), (LotId(1), 20_000, 500)]);

        let (cost, proceeds, gain) = state.gains.iter().fold((0, 0, 0), |acc, g| {
            (
                acc.0 + g.cost_basis_usd_cents.cents(),
                acc.1 + g.proceeds_usd_cents.cents(),
                acc.2 + g.gain_usd_cents.cents(),
            )
        });
        assert_eq!((cost, proceeds, gain), (1_500, 2_100, 600));

        let open = state.inventory.snapshot().to_vec();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].source_transaction_id, "lot2");
        assert_eq!(open[0].remaining_quantity_sat, Sats::from_sat(30_000));
    }

    #[test]
    fn test_scenario_insufficient_inventory() {
        let records = [
            TxRecord::new("buy", "buy", 100_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("oversell", "sell", 200_000, "2023-02-01").with_price(usd(30_000)),
        ];

        for method in Method::ALL {
            match run(&records, method) {
                Err(EngineError::InsufficientInventory {
                    disposal_id,
                    source,
                }) => {
                    assert_eq!(disposal_id, "oversell");
                    assert_eq!(
                        source,
                        InsufficientInventoryError {
                            requested: Sats::from_sat(200_000),
                            available: Sats::from_sat(100_000),
                        }
                    );
                }
                other => panic!("Expected insufficient inventory, found {other:?}"),
            }
        }
    }

    #[test]
    fn test_scenario_hifo_diverges_from_fifo() {
        let records = [
            TxRecord::new("cheap", "buy", 40_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("dear", "buy", 40_000, "2023-03-01").with_price(usd(40_000)),
            TxRecord::new("mid", "buy", 40_000, "2023-05-01").with_price(usd(30_000)),
            TxRecord::new("sale", "sell", 60_000, "2023-07-01").with_price(usd(35_000)),
        ];
        let fifo = run(&records, Method::Fifo).unwrap();
        let hifo = run(&records, Method::Hifo).unwrap();

        let order = |state: &PortfolioState| -> Vec<LotId> {
            state.gains.iter().map(|g| g.lot_id).collect()
        };
        assert_eq!(order(&fifo), vec![LotId(0), LotId(1)]);
        assert_eq!(order(&hifo), vec![LotId(1), LotId(2)]);

        let total = |state: &PortfolioState| -> i64 {
            state.gains.iter().map(|g| g.gain_usd_cents.cents()).sum()
        };
        // FIFO: 40k @ 20k + 20k @ 40k = $16.00 basis, proceeds $21.00
        assert_eq!(total(&fifo), 500);
        // HIFO: 40k @ 40k + 20k @ 30k = $22.00 basis
        assert_eq!(total(&hifo), -100);
    }

    #[test]
    fn test_transfer_carries_lots_over() {
        let records = [
            TxRecord::new("buy", "buy", 100_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("move", "transfer", 100_000, "2023-03-01").with_fee(500),
            TxRecord::new("sell", "sell", 100_000, "2024-06-01").with_price(usd(30_000)),
        ];
        let state = run(&records, Method::Fifo).unwrap();

        assert_eq!(state.stats.transaction_count(), 3);
        assert_eq!(state.stats.transfer_count(), 1);
        assert_eq!(state.stats.total_transfer_fees(), Sats::from_sat(500));
        assert_eq!(state.gains[0].acquisition_date.to_rfc3339(), "2023-01-01T00:00:00+00:00");
        assert_eq!(state.gains[0].cost_basis_usd_cents, UsdCents::from_cents(2_000));
    }

    #[test]
    fn test_cutoff() {
        let records = [
            TxRecord::new("buy", "buy", 100_000, "2023-01-01").with_price(usd(20_000)),
            TxRecord::new("sell", "sell", 40_000, "2023-06-01T12:00:00Z").with_price(usd(30_000)),
        ];
        let ledger = ledger(&records);
        let cutoff = "2023-06-01T11:59:59Z".parse().ok();

        let before = replay(&ledger, Method::Fifo, GainCalculator::default(), cutoff).unwrap();
        assert!(before.gains.is_empty());
        assert_eq!(before.inventory.balance(), Sats::from_sat(100_000));

        let at = "2023-06-01T12:00:00Z".parse().ok();
        let after = replay(&ledger, Method::Fifo, GainCalculator::default(), at).unwrap();
        assert_eq!(after.gains.len(), 1);
        assert_eq!(after.inventory.balance(), Sats::from_sat(60_000));
    }

    #[test]
    fn test_calendar_rule_applies() {
        let records = [
            TxRecord::new("buy", "buy", 10_000, "2023-02-28").with_price(usd(20_000)),
            TxRecord::new("sell", "sell", 10_000, "2024-02-29").with_price(usd(30_000)),
        ];
        let ledger = ledger(&records);

        let days = replay(&ledger, Method::Fifo, GainCalculator::default(), None).unwrap();
        let calendar = replay(
            &ledger,
            Method::Fifo,
            GainCalculator::new(HoldingPeriodRule::CalendarYear),
            None,
        )
        .unwrap();

        assert_eq!(days.gains[0].holding_days, 366);
        assert_eq!(days.gains[0].term, GainTerm::Long);
        assert_eq!(calendar.gains[0].term, GainTerm::Short);
    }
}
