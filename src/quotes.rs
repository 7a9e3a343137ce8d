//! Historical quotes from the B3 COTAHIST archive
//!
//! B3 publishes one fixed-width file per year (`COTAHIST_A<year>.ZIP`) with
//! a daily candle per traded instrument. Archives are cached under the
//! user cache directory and revalidated with If-Modified-Since, then the
//! requested symbols are filtered out and written as one CSV per symbol.
//!
//! Only daily candles exist in the source; weekly and monthly candles are
//! aggregated from them.

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use itertools::Itertools;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use zip::ZipArchive;

use crate::config::Config;

const RECORD_LEN: usize = 245;
const CASH_MARKET: &str = "010";

/// One OHLCV candle
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Shares traded
    pub volume: i64,
}

/// A daily record for one symbol as read from the archive
#[derive(Debug, Clone, PartialEq)]
pub struct CotahistRecord {
    pub symbol: String,
    pub candle: Candle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "D1" => Ok(Timeframe::Daily),
            "W1" => Ok(Timeframe::Weekly),
            "MN1" => Ok(Timeframe::Monthly),
            other => Err(format!(
                "Invalid timeframe: {} (expected D1, W1 or MN1)",
                other
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Timeframe::Daily => "D1",
            Timeframe::Weekly => "W1",
            Timeframe::Monthly => "MN1",
        };
        write!(f, "{}", label)
    }
}

impl Timeframe {
    /// First day of the bucket a trading day falls into
    fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Timeframe::Daily => date,
            Timeframe::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            Timeframe::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

/// What to fetch
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub timeframe: Timeframe,
}

impl QuoteRequest {
    fn symbol_set(&self) -> BTreeSet<String> {
        self.symbols.iter().map(|s| normalize_symbol(s)).collect()
    }

    fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

/// Progress information for archive downloads
#[derive(Debug, Clone)]
pub struct QuotesProgress {
    pub stage: QuotesStage,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotesStage {
    Downloading,
    UsingCache,
    Parsing,
    Complete { records: usize },
    Failed { reason: String },
}

/// Outcome of one quotes run
#[derive(Debug, Clone, Default)]
pub struct QuotesReport {
    /// (symbol, file, candle count)
    pub saved: Vec<(String, PathBuf, usize)>,
    pub missing: Vec<String>,
    pub failed_years: Vec<(i32, String)>,
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Get the platform-specific cache directory for COTAHIST files
pub fn cotahist_cache_dir() -> Result<PathBuf> {
    let cache_dir =
        dir_spec::cache_home().ok_or_else(|| anyhow!("Could not determine cache directory"))?;

    Ok(cache_dir.join("fundamentals").join("cotahist"))
}

pub fn archive_name(year: i32) -> String {
    format!("COTAHIST_A{}.ZIP", year)
}

fn cotahist_url(base_url: &str, year: i32) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), archive_name(year))
}

pub fn quotes_file_name(symbol: &str) -> String {
    format!("{}_quotes.csv", symbol.to_lowercase())
}

/// Fetch, filter and persist quotes for every requested symbol.
///
/// Years whose archive cannot be obtained are skipped; if none can be
/// obtained the run fails.
pub fn fetch_quotes(
    config: &Config,
    request: &QuoteRequest,
    force_redownload: bool,
    progress_callback: Option<&dyn Fn(&QuotesProgress)>,
) -> Result<QuotesReport> {
    if request.start > request.end {
        return Err(anyhow!(
            "Start date {} is after end date {}",
            request.start,
            request.end
        ));
    }

    let cache_dir = cotahist_cache_dir()?;
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.sources.http_timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    fetch_quotes_with(
        &client,
        &config.sources.cotahist_base_url,
        &cache_dir,
        &config.quotes_dir,
        request,
        force_redownload,
        progress_callback,
    )
}

/// Same as [`fetch_quotes`] with explicit client and directories
pub fn fetch_quotes_with(
    client: &Client,
    base_url: &str,
    cache_dir: &Path,
    quotes_dir: &Path,
    request: &QuoteRequest,
    force_redownload: bool,
    progress_callback: Option<&dyn Fn(&QuotesProgress)>,
) -> Result<QuotesReport> {
    let notify = |year: i32, stage: QuotesStage| {
        if let Some(callback) = progress_callback {
            callback(&QuotesProgress { stage, year });
        }
    };

    let symbols = request.symbol_set();
    let mut report = QuotesReport::default();
    let mut records = Vec::new();
    let mut obtained = 0;

    for year in request.years() {
        let outcome = download_cotahist_year(
            client,
            base_url,
            cache_dir,
            year,
            force_redownload,
            &notify,
        )
        .and_then(|zip_path| {
            notify(year, QuotesStage::Parsing);
            read_cotahist_archive(&zip_path, &symbols, request.start, request.end)
        });

        match outcome {
            Ok(year_records) => {
                notify(
                    year,
                    QuotesStage::Complete {
                        records: year_records.len(),
                    },
                );
                obtained += 1;
                records.extend(year_records);
            }
            Err(e) => {
                tracing::warn!("Skipping COTAHIST {}: {:#}", year, e);
                let reason = format!("{:#}", e);
                notify(year, QuotesStage::Failed { reason: reason.clone() });
                report.failed_years.push((year, reason));
            }
        }
    }

    if obtained == 0 {
        return Err(anyhow!(
            "No COTAHIST archive could be obtained for {}..={}",
            request.start.year(),
            request.end.year()
        ));
    }

    let mut by_symbol: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
    for record in records {
        by_symbol.entry(record.symbol).or_default().push(record.candle);
    }

    for symbol in &symbols {
        let Some(daily) = by_symbol.remove(symbol) else {
            tracing::warn!("No quotes for {} in requested range", symbol);
            report.missing.push(symbol.clone());
            continue;
        };
        let candles = aggregate(daily, request.timeframe);
        let path = quotes_dir.join(quotes_file_name(symbol));
        write_quotes(&path, &candles)?;
        report.saved.push((symbol.clone(), path, candles.len()));
    }

    Ok(report)
}

/// Download a yearly archive into `cache_dir`, reusing the cached copy when
/// the server reports it unchanged or cannot be reached
pub fn download_cotahist_year(
    client: &Client,
    base_url: &str,
    cache_dir: &Path,
    year: i32,
    force_redownload: bool,
    notify: &dyn Fn(i32, QuotesStage),
) -> Result<PathBuf> {
    fs::create_dir_all(cache_dir).context("Failed to create cache directory")?;
    let zip_path = cache_dir.join(archive_name(year));
    let url = cotahist_url(base_url, year);
    let cached = !force_redownload && zip_path.exists();

    let mut request = client.get(&url);
    if cached {
        let mtime = fs::metadata(&zip_path)
            .and_then(|m| m.modified())
            .context("Failed to read cache file metadata")?;
        request = request.header("If-Modified-Since", httpdate::fmt_http_date(mtime));
    } else {
        tracing::info!("Downloading COTAHIST {} (no cache)", year);
    }

    notify(year, QuotesStage::Downloading);
    let response = match request.send() {
        Ok(resp) => resp,
        Err(e) if cached => {
            tracing::warn!(
                "Network error checking for updates ({}), using cached COTAHIST {}",
                e,
                year
            );
            notify(year, QuotesStage::UsingCache);
            return Ok(zip_path);
        }
        Err(e) => return Err(e).context("Failed to download COTAHIST file"),
    };

    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
        tracing::debug!("COTAHIST {} not modified on server, using cache", year);
        notify(year, QuotesStage::UsingCache);
        return Ok(zip_path);
    }

    if !response.status().is_success() {
        if cached {
            tracing::warn!(
                "Failed to check for updates (status {}), using cached COTAHIST {}",
                response.status(),
                year
            );
            notify(year, QuotesStage::UsingCache);
            return Ok(zip_path);
        }
        return Err(anyhow!(
            "Download failed with status: {}. Year {} may not be available.",
            response.status(),
            year
        ));
    }

    let bytes = response
        .bytes()
        .context("Failed to read download response")?;
    tracing::debug!("Downloaded {} bytes for COTAHIST {}", bytes.len(), year);

    let tmp_path = cache_dir.join(format!("{}.tmp", archive_name(year)));
    fs::write(&tmp_path, &bytes).context("Failed to write COTAHIST to cache")?;
    fs::rename(&tmp_path, &zip_path).context("Failed to finalize cached COTAHIST")?;

    Ok(zip_path)
}

/// Read the archive's single member and keep the requested symbols within
/// `[start, end]`
pub fn read_cotahist_archive(
    zip_path: &Path,
    symbols: &BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<CotahistRecord>> {
    let file = fs::File::open(zip_path).context("Failed to open ZIP file")?;
    let mut archive = ZipArchive::new(file).context("Failed to read ZIP archive")?;
    let mut member = archive.by_index(0).context("ZIP archive is empty")?;

    let mut contents = Vec::new();
    member
        .read_to_end(&mut contents)
        .context("Failed to read COTAHIST file")?;

    let mut records = Vec::new();
    for line in contents.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(record) = parse_cotahist_line(line)? else {
            continue;
        };
        let date = record.candle.date;
        if date >= start && date <= end && symbols.contains(&record.symbol) {
            records.push(record);
        }
    }

    tracing::info!(
        "Kept {} records from {}",
        records.len(),
        zip_path.display()
    );
    Ok(records)
}

/// Parse one COTAHIST record.
///
/// Fixed-width, 245 bytes per line (1-based positions):
/// - 01-02: record type (00 header, 01 quote, 99 trailer)
/// - 03-10: trading date (YYYYMMDD)
/// - 13-24: ticker (CODNEG)
/// - 25-27: market type (TPMERC, 010 = cash market)
/// - 57-69, 70-82, 83-95, 109-121: open, high, low, close (2 implied decimals)
/// - 153-170: shares traded (QUATOT)
///
/// Only cash market quote records are returned. Fields are ASCII; the
/// company name may carry Latin-1 bytes, so the line is sliced as bytes.
pub fn parse_cotahist_line(line: &[u8]) -> Result<Option<CotahistRecord>> {
    if line.len() < RECORD_LEN || &line[0..2] != b"01" {
        return Ok(None);
    }

    let field = |start: usize, end: usize| ascii_field(line, start, end);

    if field(24, 27)? != CASH_MARKET {
        return Ok(None);
    }

    let symbol = field(12, 24)?.trim().to_string();
    if symbol.is_empty() {
        return Ok(None);
    }

    let date_str = field(2, 10)?;
    let date = NaiveDate::parse_from_str(date_str, "%Y%m%d")
        .with_context(|| format!("Invalid date: {}", date_str))?;

    let price = |start: usize| -> Result<Decimal> {
        let raw = ascii_field(line, start, start + 13)?;
        let cents: i64 = raw
            .parse()
            .with_context(|| format!("Invalid price at position {}: {}", start + 1, raw))?;
        Ok(Decimal::new(cents, 2))
    };

    let volume_str = field(152, 170)?;
    let volume: i64 = volume_str
        .parse()
        .with_context(|| format!("Invalid volume: {}", volume_str))?;

    Ok(Some(CotahistRecord {
        symbol,
        candle: Candle {
            date,
            open: price(56)?,
            high: price(69)?,
            low: price(82)?,
            close: price(108)?,
            volume,
        },
    }))
}

fn ascii_field(line: &[u8], start: usize, end: usize) -> Result<&str> {
    std::str::from_utf8(&line[start..end])
        .with_context(|| format!("Non-ASCII field at position {}", start + 1))
}

/// Aggregate daily candles into the requested timeframe.
///
/// Buckets keep the first open, the highest high, the lowest low, the last
/// close and the summed volume, dated at the bucket start.
pub fn aggregate(mut daily: Vec<Candle>, timeframe: Timeframe) -> Vec<Candle> {
    daily.sort_by_key(|c| c.date);
    daily.dedup_by_key(|c| c.date);
    if timeframe == Timeframe::Daily {
        return daily;
    }

    daily
        .into_iter()
        .chunk_by(|c| timeframe.bucket_start(c.date))
        .into_iter()
        .filter_map(|(bucket, group)| {
            group.reduce(|acc, c| Candle {
                date: acc.date,
                open: acc.open,
                high: acc.high.max(c.high),
                low: acc.low.min(c.low),
                close: c.close,
                volume: acc.volume + c.volume,
            })
            .map(|candle| Candle {
                date: bucket,
                ..candle
            })
        })
        .collect()
}

pub fn write_quotes(path: &Path, candles: &[Candle]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create quotes directory")?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;
    for c in candles {
        writer.write_record([
            c.date.format("%Y-%m-%d").to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    tracing::debug!("Wrote {} candles to {}", candles.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    // VALE3 on 2003-02-12, from B3's published layout sample
    const VALE3_LINE: &str = "012003021202VALE3       010VALE R DOCE ON           R$  000000001050100000000105010000000010250000000001036800000000103210000000010321000000001043800142000000000000069500000000000720641400000000000000009999123100000010000000000000BRVALEACNOR0159";

    fn candle(date: (i32, u32, u32), o: Decimal, h: Decimal, l: Decimal, c: Decimal, v: i64) -> Candle {
        Candle {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn test_parse_cotahist_line_valid() {
        let record = parse_cotahist_line(VALE3_LINE.as_bytes()).unwrap().unwrap();
        assert_eq!(record.symbol, "VALE3");
        assert_eq!(record.candle.date, NaiveDate::from_ymd_opt(2003, 2, 12).unwrap());
        assert_eq!(record.candle.open, dec!(105.01));
        assert_eq!(record.candle.high, dec!(105.01));
        assert_eq!(record.candle.low, dec!(102.50));
        assert_eq!(record.candle.close, dec!(103.21));
        assert_eq!(record.candle.volume, 69500);
    }

    #[test]
    fn test_parse_cotahist_line_header_and_other_markets() {
        let header = format!("{:<245}", "00COTAHIST.2023BOVESPA 20231231");
        assert!(parse_cotahist_line(header.as_bytes()).unwrap().is_none());

        let fractional = VALE3_LINE.replacen("010VALE", "020VALE", 1);
        assert!(parse_cotahist_line(fractional.as_bytes()).unwrap().is_none());

        assert!(parse_cotahist_line(b"01short").unwrap().is_none());
    }

    #[test]
    fn test_cotahist_url() {
        assert_eq!(
            cotahist_url("https://bvmf.bmfbovespa.com.br/InstDados/SerHist/", 2023),
            "https://bvmf.bmfbovespa.com.br/InstDados/SerHist/COTAHIST_A2023.ZIP"
        );
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("d1".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert_eq!("W1".parse::<Timeframe>().unwrap(), Timeframe::Weekly);
        assert_eq!("MN1".parse::<Timeframe>().unwrap(), Timeframe::Monthly);
        assert!("H1".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_weekly_aggregation() {
        // 2024-01-01 is a Monday
        let daily = vec![
            candle((2024, 1, 3), dec!(11), dec!(13), dec!(10), dec!(12), 20),
            candle((2024, 1, 2), dec!(10), dec!(12), dec!(9), dec!(11), 10),
            candle((2024, 1, 8), dec!(12), dec!(12), dec!(12), dec!(12), 5),
        ];
        let weekly = aggregate(daily, Timeframe::Weekly);
        assert_eq!(
            weekly,
            vec![
                candle((2024, 1, 1), dec!(10), dec!(13), dec!(9), dec!(12), 30),
                candle((2024, 1, 8), dec!(12), dec!(12), dec!(12), dec!(12), 5),
            ]
        );
    }

    #[test]
    fn test_monthly_aggregation() {
        let daily = vec![
            candle((2024, 1, 30), dec!(10), dec!(11), dec!(9), dec!(10), 1),
            candle((2024, 2, 1), dec!(20), dec!(21), dec!(19), dec!(20), 2),
        ];
        let monthly = aggregate(daily, Timeframe::Monthly);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[1].date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn test_read_archive_filters_symbols_and_dates() {
        let dir = tempfile::TempDir::new().unwrap();
        let zip_path = dir.path().join(archive_name(2003));
        let other = VALE3_LINE.replacen("VALE3  ", "PETR4  ", 1);
        let later = VALE3_LINE.replacen("20030212", "20030301", 1);
        {
            let file = fs::File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("COTAHIST_A2003.TXT", SimpleFileOptions::default())
                .unwrap();
            write!(zip, "{}\r\n{}\r\n{}\r\n", VALE3_LINE, other, later).unwrap();
            zip.finish().unwrap();
        }

        let symbols: BTreeSet<String> = ["VALE3".to_string()].into_iter().collect();
        let records = read_cotahist_archive(
            &zip_path,
            &symbols,
            NaiveDate::from_ymd_opt(2003, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2003, 2, 28).unwrap(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "VALE3");
    }

    #[test]
    fn test_write_quotes_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join(quotes_file_name("VALE3"));
        write_quotes(
            &path,
            &[candle((2024, 1, 2), dec!(10), dec!(12), dec!(9), dec!(11.5), 10)],
        )
        .unwrap();

        assert!(path.ends_with("vale3_quotes.csv"));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "datetime;open;high;low;close;volume\n2024-01-02;10;12;9;11.5;10\n"
        );
    }
}
