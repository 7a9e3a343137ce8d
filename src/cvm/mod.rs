//! CVM (Comissão de Valores Mobiliários) open-data model
//!
//! Types shared by the collector, the statement loader and the processing
//! pipeline: statement kinds, filing records and the chart-of-accounts lines
//! the pipeline knows about.

pub mod collector;
pub mod loader;
pub mod registry;

use crate::error::PipelineError;
use crate::utils::normalize_label;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Consolidated DFP statement files published per year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementKind {
    /// Balance sheet, assets side (BPA)
    BalanceSheetAssets,
    /// Balance sheet, liabilities and equity side (BPP)
    BalanceSheetLiabilities,
    /// Income statement (DRE)
    Income,
    /// Cash flow statement, indirect method (DFC)
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::BalanceSheetAssets,
        StatementKind::BalanceSheetLiabilities,
        StatementKind::Income,
        StatementKind::CashFlow,
    ];

    /// Code used by CVM in file names
    pub fn code(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheetAssets => "BPA_con",
            StatementKind::BalanceSheetLiabilities => "BPP_con",
            StatementKind::Income => "DRE_con",
            StatementKind::CashFlow => "DFC_MI_con",
        }
    }

    /// Per-year CSV file name, e.g. `dfp_cia_aberta_BPA_con_2023.csv`
    pub fn file_name(&self, year: i32) -> String {
        format!("dfp_cia_aberta_{}_{}.csv", self.code(), year)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which fiscal year a row belongs to inside a filing (`ORDEM_EXERC`).
///
/// Each DFP restates the prior year as a comparative column; only the
/// current-year rows are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOrder {
    /// `PENÚLTIMO`: prior-year comparative, superseded by that year's own filing
    Preliminary,
    /// `ÚLTIMO`: the current, authoritative value
    Final,
}

impl RecordOrder {
    pub fn is_final(&self) -> bool {
        matches!(self, RecordOrder::Final)
    }
}

impl FromStr for RecordOrder {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "ULTIMO" => Ok(RecordOrder::Final),
            "PENULTIMO" => Ok(RecordOrder::Preliminary),
            _ => Err(PipelineError::UnknownRecordOrder(s.to_string())),
        }
    }
}

/// One account value of one company for one reporting date
#[derive(Debug, Clone, PartialEq)]
pub struct FilingRecord {
    pub period: NaiveDate,
    pub company: String,
    pub account_code: String,
    pub account_description: String,
    pub value: Decimal,
    pub order: RecordOrder,
    /// Remaining source columns (CNPJ_CIA, VERSAO, ESCALA_MOEDA, ...)
    pub attributes: BTreeMap<String, String>,
}

impl FilingRecord {
    pub fn new(
        period: NaiveDate,
        company: impl Into<String>,
        account_code: impl Into<String>,
        account_description: impl Into<String>,
        value: Decimal,
        order: RecordOrder,
    ) -> Self {
        Self {
            period,
            company: company.into(),
            account_code: account_code.into(),
            account_description: account_description.into(),
            value,
            order,
            attributes: BTreeMap::new(),
        }
    }
}

/// Chart-of-accounts lines used by the statement layouts and ratio formulas.
///
/// Codes are fixed by the CVM standard chart for the consolidated
/// statements of non-financial companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Account {
    TotalAssets,
    CurrentAssets,
    Cash,
    Inventory,
    PrepaidExpenses,
    NonCurrentAssets,
    TotalLiabilitiesAndEquity,
    CurrentLiabilities,
    ShortTermDebt,
    NonCurrentLiabilities,
    LongTermDebt,
    Equity,
    Revenue,
    CostOfGoodsSold,
    GrossProfit,
    Ebit,
    IncomeTaxes,
    NetIncome,
    OperatingCashFlow,
    InvestingCashFlow,
    FinancingCashFlow,
    CashIncrease,
    OpeningCash,
    ClosingCash,
}

impl Account {
    pub fn code(&self) -> &'static str {
        match self {
            Account::TotalAssets => "1",
            Account::CurrentAssets => "1.01",
            Account::Cash => "1.01.01",
            Account::Inventory => "1.01.04",
            Account::PrepaidExpenses => "1.01.07",
            Account::NonCurrentAssets => "1.02",
            Account::TotalLiabilitiesAndEquity => "2",
            Account::CurrentLiabilities => "2.01",
            Account::ShortTermDebt => "2.01.04",
            Account::NonCurrentLiabilities => "2.02",
            Account::LongTermDebt => "2.02.01",
            Account::Equity => "2.03",
            Account::Revenue => "3.01",
            Account::CostOfGoodsSold => "3.02",
            Account::GrossProfit => "3.03",
            Account::Ebit => "3.05",
            Account::IncomeTaxes => "3.08",
            Account::NetIncome => "3.11",
            Account::OperatingCashFlow => "6.01",
            Account::InvestingCashFlow => "6.02",
            Account::FinancingCashFlow => "6.03",
            Account::CashIncrease => "6.05",
            Account::OpeningCash => "6.05.01",
            Account::ClosingCash => "6.05.02",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Account::TotalAssets => "Ativo Total",
            Account::CurrentAssets => "Ativo Circulante",
            Account::Cash => "Caixa e Equivalentes de Caixa",
            Account::Inventory => "Estoques",
            Account::PrepaidExpenses => "Despesas Antecipadas",
            Account::NonCurrentAssets => "Ativo Não Circulante",
            Account::TotalLiabilitiesAndEquity => "Passivo Total",
            Account::CurrentLiabilities => "Passivo Circulante",
            Account::ShortTermDebt => "Empréstimos e Financiamentos",
            Account::NonCurrentLiabilities => "Passivo Não Circulante",
            Account::LongTermDebt => "Empréstimos e Financiamentos",
            Account::Equity => "Patrimônio Líquido Consolidado",
            Account::Revenue => "Receita de Venda de Bens e/ou Serviços",
            Account::CostOfGoodsSold => "Custo dos Bens e/ou Serviços Vendidos",
            Account::GrossProfit => "Resultado Bruto",
            Account::Ebit => "Resultado Antes do Resultado Financeiro e dos Tributos",
            Account::IncomeTaxes => "Imposto de Renda e Contribuição Social sobre o Lucro",
            Account::NetIncome => "Lucro/Prejuízo Consolidado do Período",
            Account::OperatingCashFlow => "Caixa Líquido Atividades Operacionais",
            Account::InvestingCashFlow => "Caixa Líquido Atividades de Investimento",
            Account::FinancingCashFlow => "Caixa Líquido Atividades de Financiamento",
            Account::CashIncrease => "Aumento (Redução) de Caixa e Equivalentes",
            Account::OpeningCash => "Saldo Inicial de Caixa e Equivalentes",
            Account::ClosingCash => "Saldo Final de Caixa e Equivalentes",
        }
    }
}
