//! Output formatting module for CLI display
//!
//! Turns dashboard views and run summaries into terminal text, keeping
//! presentation out of the pipeline modules.

use colored::Colorize;
use rust_decimal::Decimal;
use std::str::FromStr;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Style},
};

use crate::dashboard::{CellKind, CompanyView, ViewSection};
use crate::utils::{format_decimal_br, format_ratio_br};

/// Format one stored cell for display.
///
/// Amounts use Brazilian grouping; ratios are rounded to two places. Empty
/// or unparseable cells render as "-".
pub fn format_cell(raw: &str, kind: CellKind) -> String {
    if raw.is_empty() {
        return "-".to_string();
    }
    match kind {
        CellKind::Amount => Decimal::from_str(raw)
            .map(format_decimal_br)
            .unwrap_or_else(|_| raw.to_string()),
        CellKind::Ratio => raw
            .parse::<f64>()
            .map(format_ratio_br)
            .unwrap_or_else(|_| raw.to_string()),
    }
}

pub fn format_section(section: &ViewSection) -> String {
    let mut output = format!("\n{}\n", section.title.bold());

    if section.rows.is_empty() {
        output.push_str(&format!("  {}\n", "No data".bright_black()));
        return output;
    }

    let mut builder = Builder::default();
    builder.push_record(section.headers.iter().cloned());
    for row in &section.rows {
        builder.push_record(row.iter().enumerate().map(|(i, cell)| {
            // Period column stays as is
            if i == 0 {
                cell.clone()
            } else {
                format_cell(cell, section.kind)
            }
        }));
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());

    output.push_str(&table.to_string());
    output.push('\n');
    output
}

pub fn format_company_view(view: &CompanyView) -> String {
    let mut output = format!("\n{} {}\n", "📊".cyan().bold(), view.company.bold());
    for section in &view.sections {
        output.push_str(&format_section(section));
    }
    output
}

pub fn format_company_list(companies: &[String]) -> String {
    if companies.is_empty() {
        return format_empty_dashboard();
    }
    let mut output = String::new();
    for company in companies {
        output.push_str(company);
        output.push('\n');
    }
    output.push_str(&format!(
        "\n{} {} companies\n",
        "ℹ".blue().bold(),
        companies.len()
    ));
    output
}

/// Format empty dashboard message
pub fn format_empty_dashboard() -> String {
    format!(
        "{} No processed data found\nBuild the tables first using: {} process\n",
        "ℹ".blue().bold(),
        "fundamentals".bold()
    )
}
