//! Processing pipeline: load, reshape, derive ratios, persist.
//!
//! Every stage fully materialises its table before the next one starts.
//! Outputs are rewritten on each run; identical inputs give identical files.

pub mod pivot;
pub mod ratios;
pub mod reshape;

use anyhow::{Context, Result};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::cvm::loader::{load_statement, load_statements, YearOutcome};
use crate::cvm::registry::CompanyUniverse;
use crate::cvm::StatementKind;
use crate::tables::{write_table, RatioTable, WideTable};
use ratios::RatioFamily;

pub const BALANCE_SHEET_FILE: &str = "balance_sheet.csv";
pub const INCOME_STATEMENT_FILE: &str = "income_statement.csv";
pub const CASH_FLOW_FILE: &str = "cash_flow.csv";

/// Everything one processing run produces
#[derive(Debug, Clone)]
pub struct ProcessOutputs {
    pub balance_sheet: WideTable,
    pub income_statement: WideTable,
    pub cash_flow: WideTable,
    pub ratios: Vec<(RatioFamily, RatioTable)>,
    /// Per-kind, per-year load results
    pub load_outcomes: Vec<YearOutcome>,
}

/// Build every output table from the raw files in `raw_dir`
pub fn process(
    raw_dir: &Path,
    years: RangeInclusive<i32>,
    universe: &CompanyUniverse,
) -> Result<ProcessOutputs> {
    ratios::validate_catalogue()?;

    let balance = load_statements(
        raw_dir,
        &[
            StatementKind::BalanceSheetAssets,
            StatementKind::BalanceSheetLiabilities,
        ],
        years.clone(),
    );
    let income = load_statement(raw_dir, StatementKind::Income, years.clone());
    let cash_flow_loaded = load_statement(raw_dir, StatementKind::CashFlow, years);

    let load_outcomes: Vec<YearOutcome> = [&balance, &income, &cash_flow_loaded]
        .iter()
        .flat_map(|l| l.outcomes.iter().cloned())
        .collect();
    let balance_records = balance.records;
    let income_records = income.records;
    let cash_flow_records = cash_flow_loaded.records;

    let balance_sheet = reshape::reshape(&balance_records, &reshape::BALANCE_SHEET, universe)
        .context("Failed to reshape balance sheet")?;
    let income_statement =
        reshape::reshape(&income_records, &reshape::INCOME_STATEMENT, universe)
            .context("Failed to reshape income statement")?;
    let cash_flow = reshape::reshape(&cash_flow_records, &reshape::CASH_FLOW, universe)
        .context("Failed to reshape cash flow")?;

    // Ratios read balance sheet and income statement lines together
    let mut ratio_records = balance_records;
    ratio_records.extend(income_records);
    let ratios =
        ratios::compute_all(&ratio_records, universe).context("Failed to compute ratios")?;

    Ok(ProcessOutputs {
        balance_sheet,
        income_statement,
        cash_flow,
        ratios,
        load_outcomes,
    })
}

/// Write all tables into `out_dir`; the callback sees each file as it lands.
///
/// A failure part way through leaves the files already written in place.
pub fn save_outputs(
    out_dir: &Path,
    outputs: &ProcessOutputs,
    on_saved: &dyn Fn(&Path),
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut save = |name: &str, write: &dyn Fn(&Path) -> Result<()>| -> Result<()> {
        let path = out_dir.join(name);
        write(&path)?;
        on_saved(&path);
        written.push(path);
        Ok(())
    };

    save(BALANCE_SHEET_FILE, &|p| write_table(p, &outputs.balance_sheet))?;
    save(INCOME_STATEMENT_FILE, &|p| write_table(p, &outputs.income_statement))?;
    save(CASH_FLOW_FILE, &|p| write_table(p, &outputs.cash_flow))?;
    for (family, table) in &outputs.ratios {
        save(family.file_name(), &|p| write_table(p, table))?;
    }

    Ok(written)
}
