//! Fundamentals - financial statement pipeline for Brazilian listed companies
//!
//! This library collects annual filings (DFP) published by CVM, reshapes
//! them into per-company statement tables and derives liquidity, leverage,
//! margin and profitability ratios.

pub mod cli;
pub mod config;
pub mod cvm;
pub mod dashboard;
pub mod dispatcher;
pub mod error;
pub mod processing;
pub mod quotes;
pub mod tables;
pub mod ui;
pub mod utils;
