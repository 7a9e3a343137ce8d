//! Error handling for the fundamentals pipeline
//!
//! Domain failures that callers need to match on are modelled as
//! `PipelineError`; plumbing (I/O, HTTP, CSV) is propagated with anyhow
//! context chains through the `Result` alias.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for collection and processing
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("registry error: {0}")]
    Registry(String),

    #[error("malformed filing file {path}: {reason}")]
    MalformedFile { path: PathBuf, reason: String },

    #[error("unknown record order label: {0:?}")]
    UnknownRecordOrder(String),

    #[error(
        "ambiguous pivot key: ({period}, {company}) has more than one final value for {column}"
    )]
    DuplicatePivotKey {
        period: NaiveDate,
        company: String,
        column: String,
    },

    #[error("invalid ratio catalogue: {0}")]
    InvalidCatalogue(String),

    #[error("invalid year range: {start}..={end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("unknown company {name:?}; close matches: {}", display_matches(.suggestions))]
    UnknownCompany {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_matches(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        "none".to_string()
    } else {
        suggestions.join(", ")
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = anyhow::Result<T>;
