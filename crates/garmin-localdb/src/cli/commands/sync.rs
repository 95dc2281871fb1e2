//! Sync commands for garmin-localdb

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};

use crate::client::GarminClient;
use crate::config::{CredentialStore, LocalDbConfig};
use crate::db::models::{MetricType, SyncStatus};
use crate::error::{LocalDbError, Result};
use crate::storage::HealthDb;
use crate::sync::{
    GarminActivitiesIterator, GarminApi, GarminExtractor, GarminMetricSource, RateLimiter,
    SyncManager,
};

/// Parse a `YYYY-MM-DD` argument
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| LocalDbError::InvalidDateFormat(s.to_string()))
}

pub fn parse_metric(s: &str) -> Result<MetricType> {
    s.parse()
}

/// Run sync operation
pub async fn run(
    config: &LocalDbConfig,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    metrics: Vec<MetricType>,
) -> Result<()> {
    let store = CredentialStore::new(Some(config.profile.clone()))?;
    let token = store.load_oauth2()?.ok_or(LocalDbError::NotAuthenticated)?;

    let to = to.unwrap_or_else(|| Local::now().date_naive());
    let from = from.unwrap_or(to);
    let metrics = if metrics.is_empty() {
        config.sync.metrics.clone()
    } else {
        metrics
    };

    let db_path = config.resolved_db_path();
    println!("Using database: {}", db_path.display());
    let db = HealthDb::open(&db_path)?;

    let limiter = Arc::new(RateLimiter::new(
        config.sync.request_delay(),
        config.sync.max_backoff(),
    ));
    let api = GarminApi::new(GarminClient::new(&config.domain)?, token, limiter);

    let mut manager = SyncManager::new(
        db,
        Box::new(GarminMetricSource::new(api.clone())),
        Box::new(GarminActivitiesIterator::new(
            api,
            config.sync.activities_page_size,
        )),
        Box::new(GarminExtractor),
    )
    .with_config(config.sync.clone());

    let names: Vec<&str> = metrics.iter().map(|m| m.as_str()).collect();
    println!("Syncing {} to {}: {}", from, to, names.join(", "));

    let stats = manager
        .sync_range(config.user_id, from, to, &metrics)
        .await?;
    println!("\nSync complete: {}", stats);

    if stats.failed > 0 {
        println!("Failed pairs are retried on the next run.");
    }

    Ok(())
}

/// Show sync status
pub async fn status(
    config: &LocalDbConfig,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("No database found at: {}", db_path.display());
        println!("Run 'garmin-localdb sync' to create one.");
        return Ok(());
    }

    let db = HealthDb::open(&db_path)?;
    let to = to.unwrap_or_else(|| Local::now().date_naive());
    let from = from.unwrap_or(to - Duration::days(6));

    let counts = db.sync_status_counts(config.user_id, from, to)?;
    let records = db.list_sync_status(config.user_id, from, to)?;
    let activities = db.get_activities(config.user_id, from, to)?;
    let health_days = db.get_health_metrics(config.user_id, from, to)?;

    println!("Database: {}", db_path.display());
    println!("Profile:  {}", config.profile);
    println!("Range:    {} to {}", from, to);
    println!();
    println!("Data stored:");
    println!("  Activities:    {:>8}", activities.len());
    println!("  Health days:   {:>8}", health_days.len());
    println!();
    println!("Sync status:");
    println!("  Completed:     {:>8}", counts.completed + counts.success);
    println!("  Pending:       {:>8}", counts.pending);
    println!("  Failed:        {:>8}", counts.failed);

    let unfinished: Vec<_> = records
        .iter()
        .filter(|r| !r.status.is_success())
        .collect();
    if !unfinished.is_empty() {
        println!();
        println!("{:<12} {:<20} {:<10}", "Date", "Metric", "Status");
        println!("{}", "-".repeat(44));
        for record in unfinished {
            println!(
                "{:<12} {:<20} {:<10}",
                record.sync_date,
                record.metric_type.as_str(),
                record.status.as_str()
            );
        }
    }

    Ok(())
}

/// Reset failed pairs to pending
pub async fn reset(config: &LocalDbConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("No database found at: {}", db_path.display());
        return Ok(());
    }

    let mut db = HealthDb::open(&db_path)?;
    let reset_count = db.reset_failed_sync_status(config.user_id)?;
    println!(
        "Reset {} {} pairs to {}",
        reset_count,
        SyncStatus::Failed,
        SyncStatus::Pending
    );

    Ok(())
}
