//! Statement loader: reads the per-year DFP CSV files into filing records
//!
//! Coverage is expected to be partial (years are back-filled over time), so
//! a missing year is a notice and a malformed year is dropped with an error
//! log; neither aborts the range.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use super::{FilingRecord, RecordOrder, StatementKind};
use crate::error::PipelineError;
use crate::utils::{decode_latin1, parse_decimal_br};

const COL_PERIOD: &str = "DT_REFER";
const COL_COMPANY: &str = "DENOM_CIA";
const COL_CODE: &str = "CD_CONTA";
const COL_DESCRIPTION: &str = "DS_CONTA";
const COL_VALUE: &str = "VL_CONTA";
const COL_ORDER: &str = "ORDEM_EXERC";

/// What happened to each year of a load request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearOutcome {
    Loaded {
        kind: StatementKind,
        year: i32,
        rows: usize,
    },
    Missing {
        kind: StatementKind,
        year: i32,
        path: PathBuf,
    },
    Malformed {
        kind: StatementKind,
        year: i32,
        reason: String,
    },
}

/// Concatenated long-format rows for one or more statement kinds
#[derive(Debug, Clone, Default)]
pub struct LoadedStatements {
    pub records: Vec<FilingRecord>,
    pub outcomes: Vec<YearOutcome>,
}

impl LoadedStatements {
    fn extend(&mut self, other: LoadedStatements) {
        self.records.extend(other.records);
        self.outcomes.extend(other.outcomes);
    }
}

/// Load one statement kind for every year in `years` from `base_dir`
pub fn load_statement(
    base_dir: &Path,
    kind: StatementKind,
    years: RangeInclusive<i32>,
) -> LoadedStatements {
    let mut loaded = LoadedStatements::default();

    for year in years {
        let path = base_dir.join(kind.file_name(year));
        if !path.exists() {
            tracing::warn!("No {} file for {} at {}, skipping", kind, year, path.display());
            loaded
                .outcomes
                .push(YearOutcome::Missing { kind, year, path });
            continue;
        }

        match read_statement_file(&path) {
            Ok(records) => {
                tracing::info!("Loaded {} {} rows for {}", records.len(), kind, year);
                loaded.outcomes.push(YearOutcome::Loaded {
                    kind,
                    year,
                    rows: records.len(),
                });
                loaded.records.extend(records);
            }
            Err(err) => {
                tracing::error!("Dropping {} for {}: {}", kind, year, err);
                loaded.outcomes.push(YearOutcome::Malformed {
                    kind,
                    year,
                    reason: err.to_string(),
                });
            }
        }
    }

    loaded
}

/// Load several kinds and concatenate them (e.g. BPA + BPP for the balance sheet)
pub fn load_statements(
    base_dir: &Path,
    kinds: &[StatementKind],
    years: RangeInclusive<i32>,
) -> LoadedStatements {
    let mut all = LoadedStatements::default();
    for kind in kinds {
        all.extend(load_statement(base_dir, *kind, years.clone()));
    }
    all
}

/// Read a whole file; any bad row makes the file malformed
pub fn read_statement_file(path: &Path) -> Result<Vec<FilingRecord>, PipelineError> {
    let bytes = fs::read(path).map_err(|e| PipelineError::MalformedFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_statement_csv(&decode_latin1(&bytes)).map_err(|reason| PipelineError::MalformedFile {
        path: path.to_path_buf(),
        reason,
    })
}

struct Columns {
    period: usize,
    company: usize,
    code: usize,
    description: usize,
    value: usize,
    order: usize,
}

/// Parse decoded CSV text into filing records.
///
/// Errors are returned as plain reasons; the caller attaches the path.
pub fn parse_statement_csv(content: &str) -> Result<Vec<FilingRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| format!("unreadable header: {}", e))?
        .clone();

    let find = |name: &str| -> Result<usize, String> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| format!("missing column {}", name))
    };
    let columns = Columns {
        period: find(COL_PERIOD)?,
        company: find(COL_COMPANY)?,
        code: find(COL_CODE)?,
        description: find(COL_DESCRIPTION)?,
        value: find(COL_VALUE)?,
        order: find(COL_ORDER)?,
    };
    let core = [
        columns.period,
        columns.company,
        columns.code,
        columns.description,
        columns.value,
        columns.order,
    ];

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row_num = idx + 2;
        let record = result.map_err(|e| format!("row {}: {}", row_num, e))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let period = NaiveDate::parse_from_str(field(columns.period), "%Y-%m-%d")
            .map_err(|_| format!("row {}: invalid date {:?}", row_num, field(columns.period)))?;
        let value = parse_decimal_br(field(columns.value))
            .map_err(|e| format!("row {}: {}", row_num, e))?;
        let order: RecordOrder = field(columns.order)
            .parse()
            .map_err(|e| format!("row {}: {}", row_num, e))?;

        let attributes: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !core.contains(i))
            .map(|(i, h)| (h.trim().to_string(), field(i).to_string()))
            .collect();

        records.push(FilingRecord {
            period,
            company: field(columns.company).to_string(),
            account_code: field(columns.code).to_string(),
            account_description: field(columns.description).to_string(),
            value,
            order,
            attributes,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "CNPJ_CIA;DT_REFER;VERSAO;DENOM_CIA;CD_CVM;GRUPO_DFP;MOEDA;ESCALA_MOEDA;ORDEM_EXERC;DT_FIM_EXERC;CD_CONTA;DS_CONTA;VL_CONTA;ST_CONTA_FIXA";

    #[test]
    fn parses_comma_decimal_and_keeps_extra_columns() {
        let content = format!(
            "{}\n00.000.000/0001-05;2023-12-31;1;ACME S.A.;999;DF Consolidado - Balanço Patrimonial Ativo;REAL;MIL;ÚLTIMO;2023-12-31;1.01;Ativo Circulante;1234,5600000000;S\n",
            HEADER
        );
        let records = parse_statement_csv(&content).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.period, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(r.company, "ACME S.A.");
        assert_eq!(r.account_code, "1.01");
        assert_eq!(r.value, dec!(1234.56));
        assert_eq!(r.order, RecordOrder::Final);
        assert_eq!(r.attributes.get("ESCALA_MOEDA").map(String::as_str), Some("MIL"));
        assert!(!r.attributes.contains_key("VL_CONTA"));
    }

    #[test]
    fn unreadable_year_reports_path_and_cause() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(StatementKind::Income.file_name(2023));
        // A directory under the file name exists but cannot be read as a file
        fs::create_dir_all(&path).unwrap();

        let loaded = load_statement(dir.path(), StatementKind::Income, 2023..=2023);
        assert!(loaded.records.is_empty());
        match &loaded.outcomes[..] {
            [YearOutcome::Malformed { year, reason, .. }] => {
                assert_eq!(*year, 2023);
                assert!(reason.contains(&path.display().to_string()), "{}", reason);
                assert!(reason.contains("os error"), "{}", reason);
            }
            other => panic!("expected one malformed year, got {:?}", other),
        }
    }

    #[test]
    fn missing_column_is_malformed() {
        let err = parse_statement_csv("DT_REFER;DENOM_CIA;CD_CONTA\n").unwrap_err();
        assert!(err.contains("DS_CONTA"));
    }

    #[test]
    fn unknown_order_label_is_malformed() {
        let content = format!(
            "{}\nx;2023-12-31;1;ACME S.A.;1;g;REAL;MIL;QUALQUER;2023-12-31;1;Ativo Total;1;S\n",
            HEADER
        );
        let err = parse_statement_csv(&content).unwrap_err();
        assert!(err.contains("row 2"));
    }
}
