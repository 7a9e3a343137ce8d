use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::quotes::Timeframe;

pub mod formatters;

#[derive(Parser)]
#[command(name = "fundamentals")]
#[command(
    version,
    about = "Fundamental analysis pipeline for Brazilian listed companies"
)]
#[command(
    long_about = "Collect CVM annual filings (DFP), reshape balance sheet, income statement and cash flow into wide tables, and derive liquidity, leverage, margin and profitability ratios per company and period."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Show progress logs (info level; repeat for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to $FUNDAMENTALS_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Download the company registry and yearly DFP archives from CVM
    Collect {
        /// First year to download
        #[arg(long)]
        start_year: Option<i32>,

        /// Last year to download (inclusive)
        #[arg(long)]
        end_year: Option<i32>,

        /// Directory for raw files
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Re-download archives even when cached
        #[arg(short, long)]
        force: bool,
    },

    /// Build statement tables and ratios from the raw files
    Process {
        /// First year to load
        #[arg(long)]
        start_year: Option<i32>,

        /// Last year to load (inclusive)
        #[arg(long)]
        end_year: Option<i32>,

        /// Directory holding companies.csv and the extracted statements
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Directory for the output tables
        #[arg(long)]
        processed_dir: Option<PathBuf>,
    },

    /// Download historical quotes from the B3 COTAHIST archive
    Quotes {
        /// Ticker symbols (e.g., PETR4 VALE3)
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2020-01-01")]
        start_date: NaiveDate,

        /// End date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Candle timeframe: D1, W1 or MN1
        #[arg(long, default_value = "D1")]
        timeframe: Timeframe,

        /// Re-download archives even when cached
        #[arg(short, long)]
        force: bool,
    },

    /// Show processed tables for a company
    Dashboard {
        /// Company name as registered at CVM
        #[arg(required_unless_present = "list")]
        company: Option<String>,

        /// List companies with processed data
        #[arg(short, long)]
        list: bool,

        /// Directory holding the processed tables
        #[arg(long)]
        processed_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fundamentals").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_process_overrides() {
        let cli = parse(&["process", "--start-year", "2020", "--raw-dir", "/tmp/raw"]);
        assert_eq!(
            cli.command,
            Commands::Process {
                start_year: Some(2020),
                end_year: None,
                raw_dir: Some(PathBuf::from("/tmp/raw")),
                processed_dir: None,
            }
        );
    }

    #[test]
    fn test_quotes_defaults() {
        let cli = parse(&["quotes", "PETR4", "VALE3"]);
        match cli.command {
            Commands::Quotes {
                symbols,
                start_date,
                end_date,
                timeframe,
                force,
            } => {
                assert_eq!(symbols, vec!["PETR4", "VALE3"]);
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
                assert_eq!(end_date, None);
                assert_eq!(timeframe, Timeframe::Daily);
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_invalid_timeframe_is_rejected() {
        let result = Cli::try_parse_from(["fundamentals", "quotes", "PETR4", "--timeframe", "H1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dashboard_needs_company_or_list() {
        assert!(Cli::try_parse_from(["fundamentals", "dashboard"]).is_err());
        let cli = parse(&["--no-color", "dashboard", "--list"]);
        assert!(cli.no_color);
    }
}
