//! Wide statement and ratio tables, and their persisted CSV form
//!
//! Persisted tables are semicolon separated and Latin-1 encoded, the same
//! convention as the CVM source files. Undefined values are empty cells.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;

use crate::utils::{decode_latin1, encode_latin1};

pub const PERIOD_COLUMN: &str = "DT_REFER";
pub const COMPANY_COLUMN: &str = "DENOM_CIA";

/// One row per (period, company), one column per line item
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub period: NaiveDate,
    pub company: String,
    pub values: Vec<Option<Decimal>>,
}

impl WideTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn find_row(&self, period: NaiveDate, company: &str) -> Option<&WideRow> {
        self.rows
            .iter()
            .find(|r| r.period == period && r.company == company)
    }

    /// Value of `column` in the row for (period, company), if both exist
    pub fn value(&self, period: NaiveDate, company: &str, column: &str) -> Option<Decimal> {
        let idx = self.column_index(column)?;
        self.find_row(period, company)?.values[idx]
    }
}

/// One row per (period, company), one column per named ratio
#[derive(Debug, Clone, PartialEq)]
pub struct RatioTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<RatioRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatioRow {
    pub period: NaiveDate,
    pub company: String,
    /// `NaN` where the ratio is undefined
    pub values: Vec<f64>,
}

impl RatioTable {
    pub fn value(&self, period: NaiveDate, company: &str, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| *c == column)?;
        self.rows
            .iter()
            .find(|r| r.period == period && r.company == company)
            .map(|r| r.values[idx])
    }
}

/// A table that can be written as CSV
pub trait TabularOutput {
    fn header(&self) -> Vec<String>;
    fn records(&self) -> Vec<Vec<String>>;
}

impl TabularOutput for WideTable {
    fn header(&self) -> Vec<String> {
        key_header(self.columns.iter().cloned())
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                key_cells(row.period, &row.company)
                    .into_iter()
                    .chain(row.values.iter().map(|v| format_decimal_cell(*v)))
                    .collect()
            })
            .collect()
    }
}

impl TabularOutput for RatioTable {
    fn header(&self) -> Vec<String> {
        key_header(self.columns.iter().map(|c| c.to_string()))
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                key_cells(row.period, &row.company)
                    .into_iter()
                    .chain(row.values.iter().map(|v| format_float_cell(*v)))
                    .collect()
            })
            .collect()
    }
}

fn key_header(columns: impl Iterator<Item = String>) -> Vec<String> {
    [PERIOD_COLUMN.to_string(), COMPANY_COLUMN.to_string()]
        .into_iter()
        .chain(columns)
        .collect()
}

fn key_cells(period: NaiveDate, company: &str) -> Vec<String> {
    vec![period.format("%Y-%m-%d").to_string(), company.to_string()]
}

fn format_decimal_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.normalize().to_string()).unwrap_or_default()
}

/// Shortest round-trip form, always with a fractional part ("2.0").
fn format_float_cell(value: f64) -> String {
    if value.is_finite() {
        format!("{:?}", value)
    } else {
        String::new()
    }
}

/// Write a table to `path`, creating parent directories
pub fn write_table(path: &Path, table: &impl TabularOutput) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    writer.write_record(table.header())?;
    for record in table.records() {
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV buffer: {}", e))?;
    let text = String::from_utf8(bytes).context("Table is not valid UTF-8")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(path, encode_latin1(&text))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// A persisted table read back as text cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl LoadedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Rows whose `DENOM_CIA` equals `company`
    pub fn rows_for_company(&self, company: &str) -> Vec<&Vec<String>> {
        let Some(idx) = self.column_index(COMPANY_COLUMN) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|row| row.get(idx).map(String::as_str) == Some(company))
            .collect()
    }

    /// Distinct company names, sorted
    pub fn companies(&self) -> Vec<String> {
        use itertools::Itertools;

        let Some(idx) = self.column_index(COMPANY_COLUMN) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).cloned())
            .sorted()
            .dedup()
            .collect()
    }
}

pub fn read_table(path: &Path) -> Result<LoadedTable> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content = decode_latin1(&bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read table header")?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to read row of {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(LoadedTable { headers, rows })
}
