//! Form 8949 style tax report.

use crate::basis::{LotId, Method};
use crate::model::amount::{Sats, UsdCents};
use crate::model::gains::{GainLossRecord, GainTerm, GainTotals};
use crate::util::{fixed::OverflowError, year_ext};
use chrono::NaiveDate;
use serde::Serialize;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV output is not UTF-8")]
    Utf8(#[from] FromUtf8Error),

    #[error("Arithmetic overflow")]
    Overflow(#[from] OverflowError),
}

/// One line of the report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaxDisposition {
    /// e.g. `0.00100000 BTC`
    pub description: String,
    pub lot_id: LotId,
    pub disposal_id: String,
    pub quantity_sat: Sats,
    pub date_acquired: NaiveDate,
    pub date_sold: NaiveDate,
    pub proceeds: UsdCents,
    pub cost_basis: UsdCents,
    pub gain_or_loss: UsdCents,
    pub holding_period: GainTerm,
    pub holding_days: i64,
    pub estimated: bool,
}

impl From<&GainLossRecord> for TaxDisposition {
    fn from(record: &GainLossRecord) -> Self {
        Self {
            description: format!("{} BTC", record.quantity_consumed_sat),
            lot_id: record.lot_id,
            disposal_id: record.disposal_id.clone(),
            quantity_sat: record.quantity_consumed_sat,
            date_acquired: record.acquisition_date.date_naive(),
            date_sold: record.disposal_date.date_naive(),
            proceeds: record.proceeds_usd_cents,
            cost_basis: record.cost_basis_usd_cents,
            gain_or_loss: record.gain_usd_cents,
            holding_period: record.term,
            holding_days: record.holding_days,
            estimated: record.estimated,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaxReport {
    pub year: i32,
    pub method: Method,
    pub short_term_gains: UsdCents,
    pub long_term_gains: UsdCents,
    pub total_gains: UsdCents,
    pub total_proceeds: UsdCents,
    pub total_cost_basis: UsdCents,
    pub total_quantity_sat: Sats,
    pub disposition_count: usize,
    /// Dispositions that rely on an estimated price.
    pub estimated_count: usize,
    pub dispositions: Vec<TaxDisposition>,
}

/// A report and its CSV rendering.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaxExport {
    pub report: TaxReport,
    pub csv: String,
}

impl TaxReport {
    /// Build the report from the records disposed in `year`. Records from other years are ignored.
    pub fn new(year: i32, method: Method, gains: &[GainLossRecord]) -> Result<Self, OverflowError> {
        let records: Vec<_> = year_ext::in_year(gains, year).collect();
        let totals = GainTotals::from_records(records.iter().copied())?;
        let dispositions: Vec<TaxDisposition> =
            records.into_iter().map(TaxDisposition::from).collect();

        Ok(Self {
            year,
            method,
            short_term_gains: totals.short_term,
            long_term_gains: totals.long_term,
            total_gains: totals.total,
            total_proceeds: totals.proceeds,
            total_cost_basis: totals.cost_basis,
            total_quantity_sat: totals.quantity,
            disposition_count: dispositions.len(),
            estimated_count: dispositions.iter().filter(|d| d.estimated).count(),
            dispositions,
        })
    }

    pub fn file_name(&self) -> String {
        format!("form_8949_{}_{}.csv", self.year, self.method)
    }

    /// Render dispositions, then short-term, long-term and overall totals.
    pub fn to_csv(&self) -> Result<String, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record([
            "Description of Property",
            "Date Acquired",
            "Date Sold or Disposed Of",
            "Proceeds (Sales Price)",
            "Cost or Other Basis",
            "Gain or (Loss)",
            "Term",
            "Holding Days",
            "Estimated",
        ])?;

        for row in &self.dispositions {
            writer.write_record([
                row.description.clone(),
                row.date_acquired.to_string(),
                row.date_sold.to_string(),
                row.proceeds.to_string(),
                row.cost_basis.to_string(),
                row.gain_or_loss.to_string(),
                row.holding_period.to_string(),
                row.holding_days.to_string(),
                if row.estimated { "yes" } else { "no" }.to_string(),
            ])?;
        }

        for (label, term) in [
            ("SHORT-TERM TOTALS", Some(GainTerm::Short)),
            ("LONG-TERM TOTALS", Some(GainTerm::Long)),
            ("TOTALS", None),
        ] {
            let rows = self
                .dispositions
                .iter()
                .filter(|row| term.is_none_or(|term| row.holding_period == term));
            let proceeds = UsdCents::try_sum(rows.clone().map(|row| row.proceeds))?;
            let cost_basis = UsdCents::try_sum(rows.clone().map(|row| row.cost_basis))?;
            let gain = UsdCents::try_sum(rows.map(|row| row.gain_or_loss))?;

            writer.write_record([
                label.to_string(),
                String::new(),
                String::new(),
                proceeds.to_string(),
                cost_basis.to_string(),
                gain.to_string(),
                term.map(|term| term.to_string()).unwrap_or_default(),
                String::new(),
                String::new(),
            ])?;
        }

        let data = writer.into_inner().map_err(|err| err.into_error())?;

        Ok(String::from_utf8(data)?)
    }
}
