//! Setup scout - main entry point
//!
//! This binary provides two subcommands:
//! - scan: Fetch fresh candles, generate signals, advance open trades
//! - replay: Run the engine over a historical CSV file

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "setup-scout")]
#[command(about = "Multi-timeframe signal generation and trade lifecycle tracking", long_about = None)]
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
    /// Run one scan cycle against the exchange
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scout.json")]
        config: String,

        /// Signal store path (overrides config file)
        #[arg(long)]
        store: Option<String>,

        /// Generate and track signals without sending alerts
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay the engine over a CSV candle file
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scout.json")]
        config: String,

        /// CSV file with historical candles
        #[arg(short, long)]
        file: String,

        /// Timeframe config to replay, e.g. "1h"
        #[arg(short, long, default_value = "1h")]
        timeframe: String,
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

    // Filter out noisy external crates
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
        .with_thread_ids(false)
        .with_thread_names(false)
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
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Scan { .. } => "scan",
        Commands::Replay { .. } => "replay",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Scan {
            config,
            store,
            dry_run,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::scan::run(config, store, dry_run))
        }

        Commands::Replay {
            config,
            file,
            timeframe,
        } => commands::replay::run(config, file, timeframe),
    }
}
