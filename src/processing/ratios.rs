//! Ratio engine
//!
//! Each family selects its own account codes from the long-format records,
//! pivots them and evaluates a fixed catalogue of formulas per row.
//!
//! Formulas reference [`Account`] values, never column labels. The family's
//! pivot key decides whether an account resolves to its description or its
//! code, and [`validate_catalogue`] checks up front that every formula can
//! be resolved, so a renamed or missing line is a configuration error
//! instead of a lookup failure half way through a run.
//!
//! Numeric policy: a missing input, a NaN, or a zero denominator yields NaN
//! for that ratio and row. Nothing here returns an error for bad numbers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::pivot::pivot;
use crate::cvm::registry::CompanyUniverse;
use crate::cvm::{Account, FilingRecord};
use crate::error::PipelineError;
use crate::tables::{RatioRow, RatioTable};

/// How a family labels its pivoted columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotBy {
    Description,
    Code,
}

impl PivotBy {
    fn label(&self, account: Account) -> &'static str {
        match self {
            PivotBy::Description => account.description(),
            PivotBy::Code => account.code(),
        }
    }

    fn record_label<'a>(&self, record: &'a FilingRecord) -> &'a str {
        match self {
            PivotBy::Description => &record.account_description,
            PivotBy::Code => &record.account_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RatioFamily {
    Liquidity,
    Leverage,
    Margins,
    Profitability,
}

impl RatioFamily {
    pub const ALL: [RatioFamily; 4] = [
        RatioFamily::Liquidity,
        RatioFamily::Leverage,
        RatioFamily::Margins,
        RatioFamily::Profitability,
    ];

    /// Accounts selected (by code) before pivoting
    pub fn accounts(&self) -> &'static [Account] {
        match self {
            RatioFamily::Liquidity => &[
                Account::Cash,
                Account::CurrentLiabilities,
                Account::CurrentAssets,
                Account::Inventory,
                Account::PrepaidExpenses,
                Account::NonCurrentAssets,
                Account::NonCurrentLiabilities,
            ],
            // Both debt lines are "Empréstimos e Financiamentos", so this
            // family cannot be keyed by description
            RatioFamily::Leverage => &[
                Account::TotalAssets,
                Account::CurrentLiabilities,
                Account::NonCurrentLiabilities,
                Account::ShortTermDebt,
                Account::LongTermDebt,
                Account::Equity,
                Account::Ebit,
            ],
            RatioFamily::Margins => &[
                Account::Revenue,
                Account::GrossProfit,
                Account::Ebit,
                Account::NetIncome,
            ],
            RatioFamily::Profitability => &[
                Account::TotalAssets,
                Account::TotalLiabilitiesAndEquity,
                Account::Equity,
                Account::Ebit,
                Account::IncomeTaxes,
                Account::NetIncome,
            ],
        }
    }

    pub fn pivot_by(&self) -> PivotBy {
        match self {
            RatioFamily::Liquidity => PivotBy::Description,
            _ => PivotBy::Code,
        }
    }

    pub fn ratios(&self) -> &'static [Ratio] {
        match self {
            RatioFamily::Liquidity => &[
                Ratio::ImmediateLiquidity,
                Ratio::QuickLiquidity,
                Ratio::CurrentLiquidity,
                Ratio::GeneralLiquidity,
            ],
            RatioFamily::Leverage => &[
                Ratio::DebtToEquity,
                Ratio::DebtToAssets,
                Ratio::DebtToEbit,
                Ratio::EquityToAssets,
                Ratio::LiabilitiesToAssets,
            ],
            RatioFamily::Margins => &[Ratio::GrossMargin, Ratio::NetMargin, Ratio::EbitMargin],
            RatioFamily::Profitability => &[Ratio::Roic, Ratio::Roe, Ratio::Roa],
        }
    }

    /// Name of the persisted table
    pub fn file_name(&self) -> &'static str {
        match self {
            RatioFamily::Liquidity => "liquidity.csv",
            RatioFamily::Leverage => "debt.csv",
            RatioFamily::Margins => "efficiency.csv",
            RatioFamily::Profitability => "profitability.csv",
        }
    }

    /// Heading used when the family is displayed
    pub fn title(&self) -> &'static str {
        match self {
            RatioFamily::Liquidity => "Indicadores de Liquidez",
            RatioFamily::Leverage => "Indicadores de Endividamento",
            RatioFamily::Margins => "Indicadores de Eficiência",
            RatioFamily::Profitability => "Indicadores de Rentabilidade",
        }
    }
}

impl fmt::Display for RatioFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RatioFamily::Liquidity => "liquidity",
            RatioFamily::Leverage => "leverage",
            RatioFamily::Margins => "margins",
            RatioFamily::Profitability => "profitability",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ratio {
    ImmediateLiquidity,
    QuickLiquidity,
    CurrentLiquidity,
    GeneralLiquidity,
    DebtToEquity,
    DebtToAssets,
    DebtToEbit,
    EquityToAssets,
    LiabilitiesToAssets,
    GrossMargin,
    NetMargin,
    EbitMargin,
    Roic,
    Roe,
    Roa,
}

/// Signed account reference inside a formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub account: Account,
    pub sign: f64,
}

// Expand to struct literals so `&[add!(..)]` is promoted to a `'static` slice
macro_rules! add {
    ($account:ident) => {
        Term {
            account: Account::$account,
            sign: 1.0,
        }
    };
}

macro_rules! sub {
    ($account:ident) => {
        Term {
            account: Account::$account,
            sign: -1.0,
        }
    };
}

/// `(Σ numerator) / (Σ denominator) × scale`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formula {
    pub numerator: &'static [Term],
    pub denominator: &'static [Term],
    pub scale: f64,
}

const TOTAL_DEBT: &[Term] = &[add!(ShortTermDebt), add!(LongTermDebt)];
const TOTAL_LIABILITIES: &[Term] = &[add!(CurrentLiabilities), add!(NonCurrentLiabilities)];

const fn ratio(numerator: &'static [Term], denominator: &'static [Term]) -> Formula {
    Formula {
        numerator,
        denominator,
        scale: 1.0,
    }
}

const fn percent(numerator: &'static [Term], denominator: &'static [Term]) -> Formula {
    Formula {
        numerator,
        denominator,
        scale: 100.0,
    }
}

impl Ratio {
    /// Column name in the persisted table
    pub fn column(&self) -> &'static str {
        match self {
            Ratio::ImmediateLiquidity => "liquidez_imediata",
            Ratio::QuickLiquidity => "liquidez_seca",
            Ratio::CurrentLiquidity => "liquidez_corrente",
            Ratio::GeneralLiquidity => "liquidez_geral",
            Ratio::DebtToEquity => "divida_pl",
            Ratio::DebtToAssets => "divida_ativos",
            Ratio::DebtToEbit => "divida_ebit",
            Ratio::EquityToAssets => "pl_ativos",
            Ratio::LiabilitiesToAssets => "passivos_ativos",
            Ratio::GrossMargin => "margem_bruta",
            Ratio::NetMargin => "margem_liquida",
            Ratio::EbitMargin => "margem_ebit",
            Ratio::Roic => "roic",
            Ratio::Roe => "roe",
            Ratio::Roa => "roa",
        }
    }

    pub fn formula(&self) -> Formula {
        match self {
            Ratio::ImmediateLiquidity => ratio(&[add!(Cash)], &[add!(CurrentLiabilities)]),
            Ratio::QuickLiquidity => ratio(
                &[add!(CurrentAssets), sub!(Inventory), sub!(PrepaidExpenses)],
                &[add!(CurrentLiabilities)],
            ),
            Ratio::CurrentLiquidity => ratio(&[add!(CurrentAssets)], &[add!(CurrentLiabilities)]),
            Ratio::GeneralLiquidity => ratio(
                &[add!(CurrentAssets), add!(NonCurrentAssets)],
                TOTAL_LIABILITIES,
            ),
            Ratio::DebtToEquity => ratio(TOTAL_DEBT, &[add!(Equity)]),
            Ratio::DebtToAssets => ratio(TOTAL_DEBT, &[add!(TotalAssets)]),
            Ratio::DebtToEbit => ratio(TOTAL_DEBT, &[add!(Ebit)]),
            Ratio::EquityToAssets => ratio(&[add!(Equity)], &[add!(TotalAssets)]),
            Ratio::LiabilitiesToAssets => ratio(TOTAL_LIABILITIES, &[add!(TotalAssets)]),
            Ratio::GrossMargin => percent(&[add!(GrossProfit)], &[add!(Revenue)]),
            Ratio::NetMargin => percent(&[add!(NetIncome)], &[add!(Revenue)]),
            Ratio::EbitMargin => percent(&[add!(Ebit)], &[add!(Revenue)]),
            Ratio::Roic => percent(
                &[add!(Ebit), sub!(IncomeTaxes)],
                &[add!(TotalLiabilitiesAndEquity)],
            ),
            Ratio::Roe => percent(&[add!(NetIncome)], &[add!(Equity)]),
            Ratio::Roa => percent(&[add!(NetIncome)], &[add!(TotalAssets)]),
        }
    }
}

impl Formula {
    pub fn accounts(&self) -> impl Iterator<Item = Account> + '_ {
        self.numerator
            .iter()
            .chain(self.denominator.iter())
            .map(|t| t.account)
    }

    /// Evaluate against one pivoted row
    pub fn evaluate(&self, cells: &BTreeMap<String, Decimal>, pivot_by: PivotBy) -> f64 {
        let numerator = sum_terms(self.numerator, cells, pivot_by);
        let denominator = sum_terms(self.denominator, cells, pivot_by);
        safe_div(numerator, denominator) * self.scale
    }
}

fn sum_terms(terms: &[Term], cells: &BTreeMap<String, Decimal>, pivot_by: PivotBy) -> f64 {
    terms
        .iter()
        .map(|t| {
            let value = cells
                .get(pivot_by.label(t.account))
                .and_then(|d| d.to_f64())
                .unwrap_or(f64::NAN);
            t.sign * value
        })
        .sum()
}

/// Division that never yields ±inf: zero or NaN operands give NaN
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if numerator.is_nan() || denominator.is_nan() || denominator == 0.0 {
        return f64::NAN;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        f64::NAN
    }
}

/// Check that every formula only references accounts its family selects,
/// and that description-keyed families have unambiguous descriptions.
pub fn validate_catalogue() -> Result<(), PipelineError> {
    for family in RatioFamily::ALL {
        let selected: HashSet<Account> = family.accounts().iter().copied().collect();

        for ratio in family.ratios() {
            let formula = ratio.formula();
            if formula.denominator.is_empty() {
                return Err(PipelineError::InvalidCatalogue(format!(
                    "{} has no denominator",
                    ratio.column()
                )));
            }
            let missing = formula.accounts().find(|a| !selected.contains(a));
            if let Some(missing) = missing {
                return Err(PipelineError::InvalidCatalogue(format!(
                    "{} ({}) uses {} ({}) which the family does not select",
                    ratio.column(),
                    family,
                    missing.description(),
                    missing.code()
                )));
            }
        }

        let mut labels = HashSet::new();
        for account in family.accounts() {
            if !labels.insert(family.pivot_by().label(*account)) {
                return Err(PipelineError::InvalidCatalogue(format!(
                    "{} pivots on {:?} but {:?} is shared by several accounts",
                    family,
                    family.pivot_by(),
                    family.pivot_by().label(*account)
                )));
            }
        }
    }
    Ok(())
}

/// Compute one ratio family.
///
/// Only final rows of universe companies take part. Rows with none of the
/// family's accounts do not appear; rows with some of them get NaN for the
/// ratios they cannot support.
pub fn compute_family(
    records: &[FilingRecord],
    universe: &CompanyUniverse,
    family: RatioFamily,
) -> Result<RatioTable, PipelineError> {
    let codes: HashSet<&str> = family.accounts().iter().map(|a| a.code()).collect();
    let pivot_by = family.pivot_by();

    let selected = records.iter().filter(|r| {
        r.order.is_final()
            && universe.contains(&r.company)
            && codes.contains(r.account_code.as_str())
    });
    let pivoted = pivot(selected.map(|r| (r, pivot_by.record_label(r))))?;

    let ratios = family.ratios();
    let rows: Vec<RatioRow> = pivoted
        .into_iter()
        .map(|((period, company), cells)| RatioRow {
            period,
            company,
            values: ratios
                .iter()
                .map(|r| r.formula().evaluate(&cells, pivot_by))
                .collect(),
        })
        .collect();

    tracing::info!("Computed {} ratios: {} rows", family, rows.len());

    Ok(RatioTable {
        columns: ratios.iter().map(|r| r.column()).collect(),
        rows,
    })
}

/// Compute all four families in a fixed order
pub fn compute_all(
    records: &[FilingRecord],
    universe: &CompanyUniverse,
) -> Result<Vec<(RatioFamily, RatioTable)>, PipelineError> {
    validate_catalogue()?;
    RatioFamily::ALL
        .iter()
        .map(|family| Ok((*family, compute_family(records, universe, *family)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cvm::RecordOrder;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const ACME: &str = "ACME S.A.";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
    }

    fn row(account: Account, value: Decimal) -> FilingRecord {
        FilingRecord::new(
            date(),
            ACME,
            account.code(),
            account.description(),
            value,
            RecordOrder::Final,
        )
    }

    fn universe() -> CompanyUniverse {
        [ACME.to_string()].into_iter().collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn catalogue_is_consistent() {
        validate_catalogue().unwrap();
    }

    #[test]
    fn current_liquidity_from_two_lines() {
        let records = vec![
            row(Account::CurrentAssets, dec!(100)),
            row(Account::CurrentLiabilities, dec!(50)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Liquidity).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.value(date(), ACME, "liquidez_corrente"), Some(2.0));
        // Cash is absent: undefined, not zero
        assert!(table
            .value(date(), ACME, "liquidez_imediata")
            .unwrap()
            .is_nan());
    }

    #[test]
    fn zero_denominator_is_nan() {
        let records = vec![
            row(Account::CurrentAssets, dec!(100)),
            row(Account::CurrentLiabilities, dec!(0)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Liquidity).unwrap();
        let current = table.value(date(), ACME, "liquidez_corrente").unwrap();
        assert!(current.is_nan());
    }

    #[test]
    fn quick_liquidity_subtracts_inventory_and_prepaid() {
        let records = vec![
            row(Account::CurrentAssets, dec!(100)),
            row(Account::Inventory, dec!(30)),
            row(Account::PrepaidExpenses, dec!(10)),
            row(Account::CurrentLiabilities, dec!(40)),
            row(Account::NonCurrentAssets, dec!(60)),
            row(Account::NonCurrentLiabilities, dec!(40)),
            row(Account::Cash, dec!(20)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Liquidity).unwrap();
        assert!(approx(table.value(date(), ACME, "liquidez_seca").unwrap(), 1.5));
        assert!(approx(table.value(date(), ACME, "liquidez_imediata").unwrap(), 0.5));
        assert!(approx(table.value(date(), ACME, "liquidez_geral").unwrap(), 2.0));
    }

    #[test]
    fn leverage_keeps_both_debt_lines_apart() {
        let records = vec![
            row(Account::ShortTermDebt, dec!(30)),
            row(Account::LongTermDebt, dec!(70)),
            row(Account::Equity, dec!(200)),
            row(Account::TotalAssets, dec!(400)),
            row(Account::Ebit, dec!(50)),
            row(Account::CurrentLiabilities, dec!(80)),
            row(Account::NonCurrentLiabilities, dec!(120)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Leverage).unwrap();
        assert!(approx(table.value(date(), ACME, "divida_pl").unwrap(), 0.5));
        assert!(approx(table.value(date(), ACME, "divida_ativos").unwrap(), 0.25));
        assert!(approx(table.value(date(), ACME, "divida_ebit").unwrap(), 2.0));
        assert!(approx(table.value(date(), ACME, "pl_ativos").unwrap(), 0.5));
        assert!(approx(table.value(date(), ACME, "passivos_ativos").unwrap(), 0.5));
    }

    #[test]
    fn margins_are_percentages() {
        let records = vec![
            row(Account::Revenue, dec!(1000)),
            row(Account::GrossProfit, dec!(400)),
            row(Account::Ebit, dec!(250)),
            row(Account::NetIncome, dec!(100)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Margins).unwrap();
        assert!(approx(table.value(date(), ACME, "margem_bruta").unwrap(), 40.0));
        assert!(approx(table.value(date(), ACME, "margem_ebit").unwrap(), 25.0));
        assert!(approx(table.value(date(), ACME, "margem_liquida").unwrap(), 10.0));
    }

    #[test]
    fn profitability_uses_total_liabilities_and_equity_for_roic() {
        let records = vec![
            row(Account::Ebit, dec!(300)),
            row(Account::IncomeTaxes, dec!(-100)),
            row(Account::TotalLiabilitiesAndEquity, dec!(2000)),
            row(Account::NetIncome, dec!(150)),
            row(Account::Equity, dec!(1000)),
            row(Account::TotalAssets, dec!(2000)),
        ];
        let table = compute_family(&records, &universe(), RatioFamily::Profitability).unwrap();
        // (300 - (-100)) / 2000 * 100
        assert!(approx(table.value(date(), ACME, "roic").unwrap(), 20.0));
        assert!(approx(table.value(date(), ACME, "roe").unwrap(), 15.0));
        assert!(approx(table.value(date(), ACME, "roa").unwrap(), 7.5));
    }

    #[test]
    fn companies_without_family_accounts_are_absent() {
        let records = vec![row(Account::Revenue, dec!(1000))];
        let table = compute_family(&records, &universe(), RatioFamily::Liquidity).unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn safe_div_never_returns_infinity() {
        assert!(safe_div(1.0, 0.0).is_nan());
        assert!(safe_div(0.0, 0.0).is_nan());
        assert!(safe_div(f64::NAN, 2.0).is_nan());
        assert!(safe_div(1.0, -0.0).is_nan());
        assert_eq!(safe_div(3.0, 2.0), 1.5);
    }
}
