//! Process bootstrap CLI: a `clap` derive plus a `setup_logging` helper
//! `main.rs` calls once before anything else runs.

use clap::Parser;

#[derive(Parser)]
#[command(name = "marketscrape-engine")]
#[command(about = "Scrape orchestration engine for regional Amazon marketplaces")]
#[command(version)]
pub struct Cli {
    /// Enable debug-level logging regardless of `LOG_LEVEL`.
    #[arg(long)]
    pub verbose: bool,
}

/// Install the global tracing subscriber. Honors `--verbose`, falling back
/// to `RUST_LOG`/`LOG_LEVEL` via `EnvFilter` otherwise.
pub fn setup_logging(verbose: bool, log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
