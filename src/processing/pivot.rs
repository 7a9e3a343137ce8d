//! Long-to-wide pivot keyed by (period, company)

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::cvm::FilingRecord;
use crate::error::PipelineError;

/// Row key of every wide table
pub type RowKey = (NaiveDate, String);

/// Cells of a pivot: row key -> column label -> value.
///
/// `BTreeMap` keeps rows ordered by (period, company), which is the order
/// the tables are persisted in.
pub type PivotedRows = BTreeMap<RowKey, BTreeMap<String, Decimal>>;

/// Pivot `(record, column label)` pairs into wide rows.
///
/// A second value for the same (period, company, column) cell is an error:
/// the caller has to fix the upstream data rather than have one of the two
/// values silently win.
pub fn pivot<'a, I>(cells: I) -> Result<PivotedRows, PipelineError>
where
    I: IntoIterator<Item = (&'a FilingRecord, &'a str)>,
{
    let mut rows = PivotedRows::new();

    for (record, column) in cells {
        let row = rows
            .entry((record.period, record.company.clone()))
            .or_default();
        match row.entry(column.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record.value);
            }
            Entry::Occupied(_) => {
                return Err(PipelineError::DuplicatePivotKey {
                    period: record.period,
                    company: record.company.clone(),
                    column: column.to_string(),
                });
            }
        }
    }

    Ok(rows)
}
