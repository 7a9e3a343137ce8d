//! Read-only dashboard over the processed tables
//!
//! `DashboardState` is loaded once from the processed directory and then
//! queried per company; nothing is written back.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::PipelineError;
use crate::processing::ratios::RatioFamily;
use crate::processing::{BALANCE_SHEET_FILE, INCOME_STATEMENT_FILE};
use crate::tables::{read_table, LoadedTable, COMPANY_COLUMN, PERIOD_COLUMN};

/// How the cells of a section should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Amount,
    Ratio,
}

/// One titled table in a company view
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSection {
    pub title: String,
    pub kind: CellKind,
    /// `DT_REFER` followed by the data columns; the company column is dropped
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Everything shown for one company, periods ascending
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyView {
    pub company: String,
    pub sections: Vec<ViewSection>,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    balance_sheet: LoadedTable,
    income_statement: LoadedTable,
    ratios: Vec<(RatioFamily, LoadedTable)>,
    companies: Vec<String>,
}

impl DashboardState {
    pub fn load(processed_dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            read_table(&processed_dir.join(name)).with_context(|| {
                format!(
                    "Processed table {} not found in {}; run `fundamentals process` first",
                    name,
                    processed_dir.display()
                )
            })
        };

        let balance_sheet = read(BALANCE_SHEET_FILE)?;
        let income_statement = read(INCOME_STATEMENT_FILE)?;
        let mut ratios = Vec::with_capacity(RatioFamily::ALL.len());
        for family in RatioFamily::ALL {
            ratios.push((family, read(family.file_name())?));
        }

        let state = Self::from_tables(balance_sheet, income_statement, ratios);
        tracing::info!(
            "Dashboard loaded {} companies from {}",
            state.companies.len(),
            processed_dir.display()
        );
        Ok(state)
    }

    pub fn from_tables(
        balance_sheet: LoadedTable,
        income_statement: LoadedTable,
        ratios: Vec<(RatioFamily, LoadedTable)>,
    ) -> Self {
        let companies: BTreeSet<String> = [&balance_sheet, &income_statement]
            .into_iter()
            .chain(ratios.iter().map(|(_, t)| t))
            .flat_map(LoadedTable::companies)
            .collect();

        Self {
            balance_sheet,
            income_statement,
            ratios,
            companies: companies.into_iter().collect(),
        }
    }

    /// Companies with at least one row in any table, sorted
    pub fn companies(&self) -> &[String] {
        &self.companies
    }

    /// Exact name first, then a unique case-insensitive match.
    ///
    /// Anything else is `UnknownCompany` with the case-insensitive
    /// substring matches as suggestions.
    pub fn resolve(&self, name: &str) -> Result<&str, PipelineError> {
        if let Some(found) = self.companies.iter().find(|c| *c == name) {
            return Ok(found);
        }

        let needle = name.trim().to_lowercase();
        let mut equal = self
            .companies
            .iter()
            .filter(|c| c.to_lowercase() == needle);
        if let (Some(found), None) = (equal.next(), equal.next()) {
            return Ok(found);
        }

        let suggestions = self
            .companies
            .iter()
            .filter(|c| !needle.is_empty() && c.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Err(PipelineError::UnknownCompany {
            name: name.to_string(),
            suggestions,
        })
    }

    pub fn company_view(&self, name: &str) -> Result<CompanyView, PipelineError> {
        let company = self.resolve(name)?.to_string();

        let mut sections = vec![
            section("Balanço Patrimonial", CellKind::Amount, &self.balance_sheet, &company),
            section(
                "Demonstração do Resultado",
                CellKind::Amount,
                &self.income_statement,
                &company,
            ),
        ];
        for (family, table) in &self.ratios {
            sections.push(section(family.title(), CellKind::Ratio, table, &company));
        }

        Ok(CompanyView { company, sections })
    }
}

fn section(title: &str, kind: CellKind, table: &LoadedTable, company: &str) -> ViewSection {
    let company_idx = table.column_index(COMPANY_COLUMN);
    let period_idx = table.column_index(PERIOD_COLUMN);
    let keep = |i: &usize| Some(*i) != company_idx;

    let headers = table
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| keep(i))
        .map(|(_, h)| h.clone())
        .collect();

    let mut rows: Vec<Vec<String>> = table
        .rows_for_company(company)
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(i, _)| keep(i))
                .map(|(_, cell)| cell.clone())
                .collect()
        })
        .collect();
    // ISO dates sort correctly as text; the period stays in front after dropping the company
    if period_idx.is_some() {
        rows.sort_by(|a: &Vec<String>, b: &Vec<String>| a.first().cmp(&b.first()));
    }

    ViewSection {
        title: title.to_string(),
        kind,
        headers,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> LoadedTable {
        LoadedTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn state() -> DashboardState {
        let bp = table(
            &["DT_REFER", "DENOM_CIA", "Ativo Total"],
            &[
                &["2023-12-31", "PETROBRAS S.A.", "900"],
                &["2022-12-31", "PETROBRAS S.A.", "800"],
                &["2023-12-31", "PETRORIO S.A.", "50"],
            ],
        );
        let dre = table(&["DT_REFER", "DENOM_CIA", "Receita"], &[]);
        let liq = table(
            &["DT_REFER", "DENOM_CIA", "liquidez_corrente"],
            &[&["2023-12-31", "WEG S.A.", "2.0"]],
        );
        DashboardState::from_tables(bp, dre, vec![(RatioFamily::Liquidity, liq)])
    }

    #[test]
    fn companies_are_the_union_of_all_tables() {
        assert_eq!(
            state().companies(),
            &["PETROBRAS S.A.", "PETRORIO S.A.", "WEG S.A."]
        );
    }

    #[test]
    fn view_drops_company_column_and_sorts_periods() {
        let view = state().company_view("PETROBRAS S.A.").unwrap();
        let bp = &view.sections[0];
        assert_eq!(bp.headers, vec!["DT_REFER", "Ativo Total"]);
        assert_eq!(
            bp.rows,
            vec![vec!["2022-12-31", "800"], vec!["2023-12-31", "900"]]
        );
        assert_eq!(view.sections.len(), 3);
        assert!(view.sections[2].rows.is_empty());
    }

    #[test]
    fn case_insensitive_exact_match_resolves() {
        let view = state().company_view("weg s.a.").unwrap();
        assert_eq!(view.company, "WEG S.A.");
    }

    #[test]
    fn unknown_company_suggests_substring_matches() {
        match state().company_view("petro") {
            Err(PipelineError::UnknownCompany { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["PETROBRAS S.A.", "PETRORIO S.A."]);
            }
            other => panic!("expected UnknownCompany, got {:?}", other),
        }
    }
}
