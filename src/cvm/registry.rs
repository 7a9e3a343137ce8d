//! Company registry (`cad_cia_aberta.csv`) and the company universe
//!
//! The registry lists every company that ever registered with CVM. The
//! universe keeps the ones that are active, traded on the exchange and
//! outside the financial sectors, whose statements follow a different chart
//! of accounts.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::PipelineError;
use crate::utils::{decode_latin1, encode_latin1};

pub const COMPANIES_FILENAME: &str = "companies.csv";
const COMPANY_HEADER: &str = "DENOM_SOCIAL";

const ACTIVE_STATUS: &str = "ATIVO";
const EXCHANGE_VENUE: &str = "BOLSA";

/// One row of the registry snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub name: String,
    pub status: String,
    pub venue: String,
    pub sector: String,
}

impl RegistryEntry {
    fn is_eligible(&self, excluded_sectors: &[String]) -> bool {
        self.status == ACTIVE_STATUS
            && self.venue == EXCHANGE_VENUE
            && !excluded_sectors.iter().any(|s| s == &self.sector)
    }
}

/// Companies eligible for analysis in one pipeline run.
///
/// Built once and never mutated; iteration is sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyUniverse {
    names: BTreeSet<String>,
}

impl CompanyUniverse {
    pub fn from_registry(entries: &[RegistryEntry], excluded_sectors: &[String]) -> Self {
        let names = entries
            .iter()
            .filter(|e| e.is_eligible(excluded_sectors))
            .map(|e| e.name.clone())
            .collect();
        Self { names }
    }

    pub fn contains(&self, company: &str) -> bool {
        self.names.contains(company)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Persist as a one-column semicolon CSV
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.write_record([COMPANY_HEADER])?;
        for name in &self.names {
            writer.write_record([name])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush companies CSV: {}", e))?;
        let text = String::from_utf8(bytes).context("Companies CSV is not valid UTF-8")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create companies directory")?;
        }
        fs::write(path, encode_latin1(&text))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load a list written by [`CompanyUniverse::save`]; only the first column is read
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read company list {}", path.display()))?;
        let content = decode_latin1(&bytes);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut names = BTreeSet::new();
        for result in reader.records() {
            let record = result.context("Failed to read company list row")?;
            if let Some(name) = record.get(0).map(str::trim).filter(|n| !n.is_empty()) {
                names.insert(name.to_string());
            }
        }
        Ok(Self { names })
    }
}

impl FromIterator<String> for CompanyUniverse {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Parse the registry CSV (already decoded to text)
pub fn parse_registry(content: &str) -> Result<Vec<RegistryEntry>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Registry(format!("unreadable header: {}", e)))?
        .clone();

    let column = |name: &str| -> Result<usize, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::Registry(format!("missing column {}", name)))
    };
    let name_idx = column(COMPANY_HEADER)?;
    let status_idx = column("SIT")?;
    let venue_idx = column("TP_MERC")?;
    let sector_idx = column("SETOR_ATIV")?;

    let mut entries = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| PipelineError::Registry(format!("row {}: {}", idx + 2, e)))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();

        let name = field(name_idx);
        if name.is_empty() {
            tracing::debug!("Skipping registry row {} without company name", idx + 2);
            continue;
        }

        entries.push(RegistryEntry {
            name,
            status: field(status_idx),
            venue: field(venue_idx),
            sector: field(sector_idx),
        });
    }

    tracing::info!("Parsed {} registry entries", entries.len());
    Ok(entries)
}

/// Download the registry snapshot and return its parsed entries.
///
/// Any failure here is fatal for the run: without a universe every
/// downstream table would silently be empty.
pub fn fetch_registry(url: &str, timeout_secs: u64) -> Result<Vec<RegistryEntry>> {
    tracing::info!("Downloading company registry from {}", url);

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| PipelineError::Registry(format!("download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(PipelineError::Registry(format!(
            "download failed with status {}",
            response.status()
        ))
        .into());
    }

    let bytes = response
        .bytes()
        .map_err(|e| PipelineError::Registry(format!("failed to read response: {}", e)))?;

    let entries = parse_registry(&decode_latin1(&bytes))?;
    Ok(entries)
}
