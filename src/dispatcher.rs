//! Command dispatcher that routes parsed CLI commands to their handlers.
//!
//! Handlers own the terminal output; the pipeline modules only log.

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use tracing::info;

use crate::cli::formatters::{format_company_list, format_company_view};
use crate::cli::Commands;
use crate::config::Config;
use crate::cvm::collector::{self, CollectProgress, CollectStage};
use crate::cvm::loader::YearOutcome;
use crate::cvm::registry::{CompanyUniverse, COMPANIES_FILENAME};
use crate::dashboard::DashboardState;
use crate::processing;
use crate::quotes::{self, QuoteRequest, QuotesProgress, QuotesStage};
use crate::ui::progress::{ProgressEvent, ProgressPrinter};

/// Route a parsed command to its handler
pub fn dispatch_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Collect {
            start_year,
            end_year,
            raw_dir,
            force,
        } => {
            let config = config.with_overrides(start_year, end_year, raw_dir, None)?;
            dispatch_collect(&config, force)
        }
        Commands::Process {
            start_year,
            end_year,
            raw_dir,
            processed_dir,
        } => {
            let config = config.with_overrides(start_year, end_year, raw_dir, processed_dir)?;
            dispatch_process(&config)
        }
        Commands::Quotes {
            symbols,
            start_date,
            end_date,
            timeframe,
            force,
        } => {
            let request = QuoteRequest {
                symbols,
                start: start_date,
                end: end_date.unwrap_or_else(|| Local::now().date_naive()),
                timeframe,
            };
            dispatch_quotes(&config, &request, force)
        }
        Commands::Dashboard {
            company,
            list,
            processed_dir,
        } => {
            let config = config.with_overrides(None, None, None, processed_dir)?;
            dispatch_dashboard(&config, company.as_deref(), list)
        }
    }
}

fn dispatch_collect(config: &Config, force: bool) -> Result<()> {
    info!(
        "Collecting DFP {}..={} into {}",
        config.start_year,
        config.end_year,
        config.raw_dir.display()
    );

    let printer = ProgressPrinter::new();
    let callback = |progress: &CollectProgress| {
        let year = progress.year;
        let event = match &progress.stage {
            CollectStage::Downloading => {
                ProgressEvent::spinner(format!("📥 Downloading DFP {}", year))
            }
            CollectStage::UsingCache => {
                ProgressEvent::spinner(format!("📦 DFP {} unchanged, using cache", year))
            }
            CollectStage::Extracting => {
                ProgressEvent::spinner(format!("📦 Extracting DFP {}", year))
            }
            CollectStage::Complete { extracted } => {
                ProgressEvent::success(format!("DFP {}: {} statements", year, extracted))
            }
            CollectStage::Failed { reason } => {
                ProgressEvent::error(format!("DFP {}: {}", year, reason))
            }
        };
        printer.on_event(event);
    };

    let report = collector::run_collection(config, force, Some(&callback))?;
    printer.finish();

    println!(
        "{} Saved: {} ({} companies)",
        "✓".green(),
        config.raw_dir.join(COMPANIES_FILENAME).display(),
        report.universe.len()
    );
    if !report.failed_years.is_empty() {
        let years: Vec<String> = report
            .failed_years
            .iter()
            .map(|(y, _)| y.to_string())
            .collect();
        println!(
            "{} {} year(s) could not be collected: {}",
            "⚠".yellow(),
            years.len(),
            years.join(", ")
        );
    }
    Ok(())
}

fn dispatch_process(config: &Config) -> Result<()> {
    let companies_path = config.raw_dir.join(COMPANIES_FILENAME);
    let universe = CompanyUniverse::load(&companies_path).with_context(|| {
        format!(
            "Company universe not found at {}; run `fundamentals collect` first",
            companies_path.display()
        )
    })?;
    info!(
        "Processing {}..={} for {} companies",
        config.start_year,
        config.end_year,
        universe.len()
    );

    let outputs = processing::process(&config.raw_dir, config.years(), &universe)?;

    for outcome in &outputs.load_outcomes {
        if let YearOutcome::Malformed { kind, year, reason } = outcome {
            println!("{} {} {} dropped: {}", "✗".red(), kind, year, reason);
        }
    }
    let loaded = outputs
        .load_outcomes
        .iter()
        .filter(|o| matches!(o, YearOutcome::Loaded { .. }))
        .count();
    if loaded == 0 {
        println!(
            "{} No statement files found in {}",
            "⚠".yellow(),
            config.raw_dir.display()
        );
    }

    processing::save_outputs(&config.processed_dir, &outputs, &|path| {
        println!("{} Saved: {}", "✓".green(), path.display());
    })?;
    Ok(())
}

fn dispatch_quotes(config: &Config, request: &QuoteRequest, force: bool) -> Result<()> {
    info!(
        "Fetching {} quotes for {:?} from {} to {}",
        request.timeframe, request.symbols, request.start, request.end
    );

    let printer = ProgressPrinter::new();
    let callback = |progress: &QuotesProgress| {
        let year = progress.year;
        let event = match &progress.stage {
            QuotesStage::Downloading => {
                ProgressEvent::spinner(format!("📥 Downloading COTAHIST {}", year))
            }
            QuotesStage::UsingCache => {
                ProgressEvent::spinner(format!("📦 Using cached COTAHIST {}", year))
            }
            QuotesStage::Parsing => {
                ProgressEvent::spinner(format!("📝 Parsing COTAHIST {}", year))
            }
            QuotesStage::Complete { records } => {
                ProgressEvent::spinner(format!("COTAHIST {}: {} records", year, records))
            }
            QuotesStage::Failed { reason } => {
                ProgressEvent::error(format!("COTAHIST {}: {}", year, reason))
            }
        };
        printer.on_event(event);
    };

    let report = quotes::fetch_quotes(config, request, force, Some(&callback))?;
    printer.finish();

    for (_, path, count) in &report.saved {
        println!(
            "{} Saved: {} ({} candles)",
            "✓".green(),
            path.display(),
            count
        );
    }
    for symbol in &report.missing {
        println!("{} No data for {}", "✗".red(), symbol);
    }
    Ok(())
}

fn dispatch_dashboard(config: &Config, company: Option<&str>, list: bool) -> Result<()> {
    let state = DashboardState::load(&config.processed_dir)?;

    match company {
        Some(name) if !list => {
            let view = state.company_view(name)?;
            print!("{}", format_company_view(&view));
        }
        _ => print!("{}", format_company_list(state.companies())),
    }
    Ok(())
}
