//! Crypto trading dashboard - main entry point
//!
//! This binary provides three subcommands:
//! - snapshot: Run one refresh cycle and print the dashboard JSON
//! - run: Run refresh cycles on an interval
//! - download: Download historical candles from Binance to CSV

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-dashboard")]
#[command(about = "Single-symbol crypto trading dashboard engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one refresh cycle and print the dashboard snapshot as JSON
    Snapshot {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Read candles from the CSV cache instead of the network
        #[arg(long)]
        offline: bool,

        /// Sentiment score supplied by an external analyzer
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        sentiment: f64,
    },

    /// Run refresh cycles on an interval
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Cycle interval in seconds
        #[arg(long, default_value = "60")]
        interval: u64,

        /// Sentiment score supplied by an external analyzer
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        sentiment: f64,
    },

    /// Download historical candles from Binance to the CSV cache
    Download {
        /// Symbols to download (comma-separated). E.g., "BTCUSDT,ETHUSDT"
        #[arg(short, long, default_value = "BTCUSDT")]
        symbols: String,

        /// Timeframe intervals (comma-separated). E.g., "1h,4h,1d"
        #[arg(short, long, default_value = "1h")]
        timeframes: String,

        /// Number of candles to fetch per pair
        #[arg(long, default_value = "1000")]
        count: u32,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Snapshot { .. } => "snapshot",
        Commands::Run { .. } => "run",
        Commands::Download { .. } => "download",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Snapshot {
            config,
            offline,
            sentiment,
        } => commands::snapshot::run(config, offline, sentiment),

        Commands::Run {
            config,
            interval,
            sentiment,
        } => commands::run::run(config, interval, sentiment),

        Commands::Download {
            symbols,
            timeframes,
            count,
            output,
        } => commands::download::run(symbols, timeframes, count, output),
    }
}
