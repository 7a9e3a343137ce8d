//! Statement reshaper: filtered long rows -> wide per-(period, company) tables

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::pivot::pivot;
use crate::cvm::registry::CompanyUniverse;
use crate::cvm::{Account, FilingRecord};
use crate::error::PipelineError;
use crate::tables::{WideRow, WideTable};

/// Column added to the balance sheet: liabilities without equity
pub const LIABILITIES_ONLY_COLUMN: &str = "passivo";

/// Columns computed from other columns after the pivot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedColumn {
    /// `Passivo Total` − `Patrimônio Líquido Consolidado`. The source
    /// "Passivo Total" line includes equity.
    LiabilitiesOnly,
}

impl DerivedColumn {
    pub fn name(&self) -> &'static str {
        match self {
            DerivedColumn::LiabilitiesOnly => LIABILITIES_ONLY_COLUMN,
        }
    }

    fn compute(&self, cells: &BTreeMap<String, Decimal>) -> Option<Decimal> {
        match self {
            DerivedColumn::LiabilitiesOnly => {
                let total = cells.get(Account::TotalLiabilitiesAndEquity.description())?;
                let equity = cells.get(Account::Equity.description())?;
                Some(*total - *equity)
            }
        }
    }
}

/// Allow-list and post-processing for one reshaped statement
#[derive(Debug, Clone, Copy)]
pub struct StatementLayout {
    pub name: &'static str,
    /// Line items kept, in output column order
    pub items: &'static [Account],
    /// Also require the account code to be one of the items' codes
    pub match_codes: bool,
    pub derived: &'static [DerivedColumn],
}

pub const BALANCE_SHEET: StatementLayout = StatementLayout {
    name: "balance_sheet",
    items: &[
        Account::TotalAssets,
        Account::TotalLiabilitiesAndEquity,
        Account::Equity,
        Account::CurrentAssets,
        Account::NonCurrentAssets,
        Account::CurrentLiabilities,
        Account::NonCurrentLiabilities,
    ],
    match_codes: false,
    derived: &[DerivedColumn::LiabilitiesOnly],
};

pub const INCOME_STATEMENT: StatementLayout = StatementLayout {
    name: "income_statement",
    items: &[
        Account::Revenue,
        Account::CostOfGoodsSold,
        Account::NetIncome,
    ],
    match_codes: true,
    derived: &[],
};

// Cash flow codes differ between companies, so only descriptions are matched
pub const CASH_FLOW: StatementLayout = StatementLayout {
    name: "cash_flow",
    items: &[
        Account::OperatingCashFlow,
        Account::InvestingCashFlow,
        Account::FinancingCashFlow,
        Account::CashIncrease,
        Account::OpeningCash,
        Account::ClosingCash,
    ],
    match_codes: false,
    derived: &[],
};

impl StatementLayout {
    /// Output columns: line items in allow-list order, then derived columns
    pub fn columns(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|a| a.description().to_string())
            .chain(self.derived.iter().map(|d| d.name().to_string()))
            .collect()
    }

    fn accepts(&self, record: &FilingRecord) -> bool {
        let description_ok = self
            .items
            .iter()
            .any(|a| a.description() == record.account_description);
        let code_ok = !self.match_codes
            || self.items.iter().any(|a| a.code() == record.account_code);
        description_ok && code_ok
    }
}

/// Reshape long-format records into a wide table.
///
/// Keeps final rows of universe companies whose line item is allow-listed,
/// pivots on (period, company) x description and appends derived columns.
/// A company with no matching rows in a period produces no row.
pub fn reshape(
    records: &[FilingRecord],
    layout: &StatementLayout,
    universe: &CompanyUniverse,
) -> Result<WideTable, PipelineError> {
    let selected = records.iter().filter(|r| {
        r.order.is_final() && universe.contains(&r.company) && layout.accepts(r)
    });

    let pivoted = pivot(selected.map(|r| (r, r.account_description.as_str())))?;

    let rows: Vec<WideRow> = pivoted
        .into_iter()
        .map(|((period, company), cells)| {
            let values = layout
                .items
                .iter()
                .map(|a| cells.get(a.description()).copied())
                .chain(layout.derived.iter().map(|d| d.compute(&cells)))
                .collect();
            WideRow {
                period,
                company,
                values,
            }
        })
        .collect();

    tracing::info!("Reshaped {}: {} rows", layout.name, rows.len());

    Ok(WideTable {
        columns: layout.columns(),
        rows,
    })
}
