use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fundamentals::cli::Cli;
use fundamentals::config::Config;
use fundamentals::dispatcher::dispatch_command;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();
    if no_color {
        colored::control::set_override(false);
    }

    // RUST_LOG wins; otherwise stay quiet unless --verbose
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fundamentals={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    dispatch_command(cli.command, config)
}
