use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use garmin_localdb::cli::commands;
use garmin_localdb::config::LocalDbConfig;
use garmin_localdb::MetricType;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "garmin-localdb")]
#[command(author, version, about = "Local SQLite mirror of Garmin Connect health data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/garmin/localdb.json)
    #[arg(long, global = true, env = "GARMIN_LOCALDB_CONFIG")]
    config: Option<PathBuf>,

    /// Profile to use
    #[arg(short, long, global = true, env = "GARMIN_PROFILE")]
    profile: Option<String>,

    /// Database file path
    #[arg(long, global = true, env = "GARMIN_LOCALDB_PATH")]
    db: Option<PathBuf>,

    /// Local user id for stored rows
    #[arg(long, global = true)]
    user_id: Option<i64>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a date range into the local database
    Sync {
        /// Start date (YYYY-MM-DD), defaults to --to
        #[arg(long, value_parser = commands::parse_date)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = commands::parse_date)]
        to: Option<NaiveDate>,
        /// Metric to sync (repeatable); defaults to the configured set
        #[arg(long = "metric", value_parser = commands::parse_metric)]
        metrics: Vec<MetricType>,
    },
    /// Show sync status
    Status {
        /// Start date (YYYY-MM-DD), defaults to a week before --to
        #[arg(long, value_parser = commands::parse_date)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = commands::parse_date)]
        to: Option<NaiveDate>,
    },
    /// Reset failed pairs to pending
    Reset,
}

fn load_config(cli: &Cli) -> garmin_localdb::Result<LocalDbConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => LocalDbConfig::default_path()?,
    };
    let mut config = LocalDbConfig::load(&path)?;

    if let Some(profile) = &cli.profile {
        config.profile = profile.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(user_id) = cli.user_id {
        config.user_id = user_id;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Sync { from, to, metrics } => {
                commands::sync_run(&config, from, to, metrics).await
            }
            Commands::Status { from, to } => commands::sync_status(&config, from, to).await,
            Commands::Reset => commands::sync_reset(&config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
