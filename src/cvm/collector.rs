//! DFP collector: downloads yearly archives from the CVM portal and extracts
//! the consolidated statement CSVs.
//!
//! Key features:
//! - One attempt per year; a failed year is reported and the loop moves on
//! - Cached archives are revalidated with If-Modified-Since instead of
//!   being re-downloaded every run
//! - Only the statement members the pipeline reads are extracted

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::ZipArchive;

use super::registry::{self, CompanyUniverse, COMPANIES_FILENAME};
use super::StatementKind;
use crate::config::Config;

const META_FILENAME: &str = "collect.meta.json";

/// Progress information for per-year downloads
#[derive(Debug, Clone)]
pub struct CollectProgress {
    pub stage: CollectStage,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectStage {
    Downloading,
    UsingCache,
    Extracting,
    Complete { extracted: usize },
    Failed { reason: String },
}

/// Summary written next to the raw files after a collection run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectMeta {
    pub fetched_at: DateTime<Utc>,
    pub registry_url: String,
    pub dfp_base_url: String,
    pub companies: usize,
    pub succeeded_years: Vec<i32>,
    pub failed_years: Vec<i32>,
}

/// Result of a full collection run
#[derive(Debug, Clone)]
pub struct CollectReport {
    pub universe: CompanyUniverse,
    pub succeeded_years: Vec<i32>,
    pub failed_years: Vec<(i32, String)>,
}

pub fn archive_name(year: i32) -> String {
    format!("dfp_cia_aberta_{}.zip", year)
}

fn archive_url(base_url: &str, year: i32) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), archive_name(year))
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// Run the complete collection: registry, archives, extraction, metadata.
///
/// The registry step is fatal on failure; archive years are not.
pub fn run_collection(
    config: &Config,
    force_redownload: bool,
    progress_callback: Option<&dyn Fn(&CollectProgress)>,
) -> Result<CollectReport> {
    fs::create_dir_all(&config.raw_dir).context("Failed to create raw data directory")?;

    let entries = registry::fetch_registry(
        &config.sources.registry_url,
        config.sources.http_timeout_secs,
    )
    .context("Failed to build company universe")?;
    let universe = CompanyUniverse::from_registry(&entries, &config.excluded_sectors);
    if universe.is_empty() {
        tracing::warn!("Company universe is empty; processed tables will be empty");
    }
    universe.save(&config.raw_dir.join(COMPANIES_FILENAME))?;
    tracing::info!("Saved {} companies", universe.len());

    let client = http_client(config.sources.http_timeout_secs)?;
    let (succeeded_years, failed_years) = collect_years(
        &client,
        &config.sources.dfp_base_url,
        &config.raw_dir,
        config.years(),
        force_redownload,
        progress_callback,
    );

    let meta = CollectMeta {
        fetched_at: Utc::now(),
        registry_url: config.sources.registry_url.clone(),
        dfp_base_url: config.sources.dfp_base_url.clone(),
        companies: universe.len(),
        succeeded_years: succeeded_years.clone(),
        failed_years: failed_years.iter().map(|(y, _)| *y).collect(),
    };
    write_meta(&config.raw_dir, &meta)?;

    Ok(CollectReport {
        universe,
        succeeded_years,
        failed_years,
    })
}

/// Download and extract every year, continuing past failures
pub fn collect_years(
    client: &Client,
    base_url: &str,
    raw_dir: &Path,
    years: RangeInclusive<i32>,
    force_redownload: bool,
    progress_callback: Option<&dyn Fn(&CollectProgress)>,
) -> (Vec<i32>, Vec<(i32, String)>) {
    let notify = |year: i32, stage: CollectStage| {
        if let Some(callback) = progress_callback {
            callback(&CollectProgress { stage, year });
        }
    };

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for year in years {
        let outcome = download_archive(client, base_url, raw_dir, year, force_redownload, &notify)
            .and_then(|zip_path| {
                notify(year, CollectStage::Extracting);
                extract_statements(&zip_path, raw_dir)
            });

        match outcome {
            Ok(extracted) => {
                notify(year, CollectStage::Complete { extracted });
                succeeded.push(year);
            }
            Err(e) => {
                tracing::warn!("Skipping DFP {}: {:#}", year, e);
                let reason = format!("{:#}", e);
                notify(year, CollectStage::Failed { reason: reason.clone() });
                failed.push((year, reason));
            }
        }
    }

    (succeeded, failed)
}

/// Download a yearly archive into `raw_dir`, reusing the cached copy when
/// the server reports it unchanged
pub fn download_archive(
    client: &Client,
    base_url: &str,
    raw_dir: &Path,
    year: i32,
    force_redownload: bool,
    notify: &dyn Fn(i32, CollectStage),
) -> Result<PathBuf> {
    let zip_path = raw_dir.join(archive_name(year));
    let url = archive_url(base_url, year);

    let mut request = client.get(&url);
    if !force_redownload && zip_path.exists() {
        let mtime = fs::metadata(&zip_path)
            .and_then(|m| m.modified())
            .context("Failed to read cached archive mtime")?;
        request = request.header("If-Modified-Since", httpdate::fmt_http_date(mtime));
    }

    notify(year, CollectStage::Downloading);
    let response = request
        .send()
        .with_context(|| format!("Failed to download {}", url))?;

    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
        tracing::debug!("DFP {} not modified on server, using cache", year);
        notify(year, CollectStage::UsingCache);
        return Ok(zip_path);
    }

    if !response.status().is_success() {
        return Err(anyhow!(
            "Download failed with status: {}. Year {} may not be available.",
            response.status(),
            year
        ));
    }

    let bytes = response
        .bytes()
        .context("Failed to read download response")?;
    tracing::debug!("Downloaded {} bytes for DFP {}", bytes.len(), year);

    let tmp_path = raw_dir.join(format!("{}.tmp", archive_name(year)));
    fs::write(&tmp_path, &bytes).context("Failed to write DFP archive")?;
    fs::rename(&tmp_path, &zip_path).context("Failed to finalize DFP archive")?;

    Ok(zip_path)
}

/// Extract the consolidated statement members of an archive.
///
/// Returns how many members were written.
pub fn extract_statements(zip_path: &Path, out_dir: &Path) -> Result<usize> {
    let file = fs::File::open(zip_path).context("Failed to open ZIP file")?;
    let mut archive = ZipArchive::new(file).context("Failed to read ZIP archive")?;

    let mut extracted = 0;
    for idx in 0..archive.len() {
        let mut member = archive.by_index(idx).context("Failed to read ZIP entry")?;
        let Some(name) = member
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        else {
            continue;
        };
        if !is_statement_member(&name) {
            continue;
        }

        let mut contents = Vec::new();
        member
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to read {}", name))?;
        fs::write(out_dir.join(&name), &contents)
            .with_context(|| format!("Failed to write {}", name))?;
        extracted += 1;
    }

    if extracted == 0 {
        return Err(anyhow!(
            "{} contains no consolidated statements",
            zip_path.display()
        ));
    }

    tracing::info!("Extracted {} statements from {}", extracted, zip_path.display());
    Ok(extracted)
}

fn is_statement_member(name: &str) -> bool {
    StatementKind::ALL.iter().any(|kind| {
        name.strip_prefix("dfp_cia_aberta_")
            .and_then(|rest| rest.strip_prefix(kind.code()))
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(".csv"))
            .is_some_and(|year| year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()))
    })
}

pub fn write_meta(raw_dir: &Path, meta: &CollectMeta) -> Result<()> {
    let path = raw_dir.join(META_FILENAME);
    fs::write(&path, serde_json::to_vec_pretty(meta)?).context("Failed to write collect metadata")
}
