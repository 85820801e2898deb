mod config;
mod errors;
mod market_data;
mod models;
mod notify;
mod runner;
mod schedule;
mod screening;
mod storage;

use anyhow::Context;
use clap::Parser;
use config::Config;
use errors::Result;
use runner::Monitor;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "Annual Line Monitor")]
#[command(author = "Annual Line Monitor Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Screens index constituents against their 250-day moving average and pushes alerts", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Operating mode (overrides config): once or watch
    #[arg(short, long)]
    mode: Option<String>,

    /// Screen and print results without sending notifications
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated security codes to screen instead of resolving indices
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Print statistics from the alert log and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Reading the alert log needs no provider or relay secrets
    if args.stats {
        println!("{}", stats_report(&config)?);
        return Ok(());
    }

    config.expand_env_vars()?;

    if let Some(mode) = args.mode {
        config.general.mode = mode;
        config.validate()?;
    }

    init_logging(&config.logging.level)?;

    info!("Starting Annual Line Monitor v0.1.0");
    info!("Mode: {}", config.general.mode);

    let mode = config.general.mode.clone();
    let monitor = Monitor::new(config, args.dry_run, args.symbols)
        .context("Failed to initialise monitor")?;

    match mode.as_str() {
        "once" => {
            monitor.run_and_report().await?;
        }
        "watch" => monitor.watch().await?,
        other => {
            error!("Invalid mode: {}", other);
            anyhow::bail!("Invalid mode: {}. Must be 'once' or 'watch'", other);
        }
    }

    Ok(())
}

/// Alert-log statistics as pretty JSON
fn stats_report(config: &Config) -> Result<String> {
    let stats = storage::AlertLog::new(config.storage.alert_log.clone()).statistics()?;
    Ok(serde_json::to_string_pretty(&stats)?)
}

/// Initialize logging based on configuration; RUST_LOG takes precedence
fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| errors::MonitorError::Unknown(format!("Failed to set logger: {}", e)))?;

    Ok(())
}
