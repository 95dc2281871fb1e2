//! Sync module for Garmin data synchronization
//!
//! Provides:
//! - [`SyncManager`]: resumable per-(date, metric) sync into the local store
//! - Collaborator traits for fetching and extracting remote data
//! - Garmin Connect implementations of those collaborators
//! - Rate-limited API access

pub mod extractor;
pub mod garmin;
pub mod rate_limiter;
pub mod source;

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::config::SyncConfig;
use crate::db::models::{ActivityRecord, MetricType, StorageKind, SyncStatus};
use crate::error::{LocalDbError, Result};
use crate::storage::HealthDb;

pub use extractor::GarminExtractor;
pub use garmin::{GarminActivitiesIterator, GarminApi, GarminMetricSource};
pub use rate_limiter::RateLimiter;
pub use source::{ActivitiesIterator, DataExtractor, MetricData, MetricSource};

/// Statistics from a sync run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Pairs fetched and stored
    pub completed: u32,
    /// Pairs already synced, or failed with retries disabled
    pub skipped: u32,
    /// Pairs that failed this run
    pub failed: u32,
    pub activities_stored: u32,
    /// New time-series rows (duplicates not counted)
    pub samples_stored: u32,
}

impl SyncStats {
    fn record(&mut self, outcome: PairOutcome) {
        self.completed += 1;
        self.activities_stored += outcome.activities;
        self.samples_stored += outcome.samples;
    }
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Completed: {}, Skipped: {}, Failed: {}",
            self.completed, self.skipped, self.failed
        )?;
        if self.activities_stored > 0 {
            write!(f, ", Activities: {}", self.activities_stored)?;
        }
        if self.samples_stored > 0 {
            write!(f, ", Samples: {}", self.samples_stored)?;
        }
        Ok(())
    }
}

/// What one successful pair wrote
#[derive(Debug, Default, Clone, Copy)]
struct PairOutcome {
    activities: u32,
    samples: u32,
}

/// Orchestrates fetching remote data into a [`HealthDb`].
///
/// Every (date, metric) pair is tracked in `sync_status` and handled
/// independently: a failure is recorded and the run moves on. Pairs already in
/// a success state are never fetched again.
pub struct SyncManager {
    db: HealthDb,
    source: Box<dyn MetricSource>,
    activities: Box<dyn ActivitiesIterator>,
    extractor: Box<dyn DataExtractor>,
    config: SyncConfig,
    activities_ready: bool,
}

impl SyncManager {
    pub fn new(
        db: HealthDb,
        source: Box<dyn MetricSource>,
        activities: Box<dyn ActivitiesIterator>,
        extractor: Box<dyn DataExtractor>,
    ) -> Self {
        Self {
            db,
            source,
            activities,
            extractor,
            config: SyncConfig::default(),
            activities_ready: false,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn db(&self) -> &HealthDb {
        &self.db
    }

    pub fn into_db(self) -> HealthDb {
        self.db
    }

    /// Sync every metric in `metrics` for each day of `start..=end`.
    ///
    /// Store errors while reading or writing sync status abort the run; fetch,
    /// extraction and data-write errors only fail their own pair.
    pub async fn sync_range(
        &mut self,
        user_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        metrics: &[MetricType],
    ) -> Result<SyncStats> {
        if start_date > end_date {
            return Err(LocalDbError::validation(format!(
                "Start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let mut seen = HashSet::new();
        let metrics: Vec<MetricType> = metrics.iter().copied().filter(|m| seen.insert(*m)).collect();

        tracing::info!(user_id, from = %start_date, to = %end_date, metrics = metrics.len(), "Starting sync");

        let mut stats = SyncStats::default();
        for date in start_date.iter_days().take_while(|d| *d <= end_date) {
            for &metric in &metrics {
                if !self.prepare_pair(user_id, date, metric)? {
                    stats.skipped += 1;
                    continue;
                }

                match self.sync_pair(user_id, date, metric).await {
                    Ok(outcome) => {
                        self.db
                            .update_sync_status(user_id, date, metric, SyncStatus::Completed)?;
                        stats.record(outcome);
                    }
                    Err(e) => {
                        if e.is_fetch_error() {
                            tracing::warn!(user_id, %date, %metric, error = %e, "Fetch failed");
                        } else {
                            tracing::error!(user_id, %date, %metric, error = %e, "Storing fetched data failed");
                        }
                        self.db
                            .update_sync_status(user_id, date, metric, SyncStatus::Failed)?;
                        stats.failed += 1;
                    }
                }
            }
        }

        tracing::info!(user_id, %stats, "Sync finished");
        Ok(stats)
    }

    /// Ensure a status row exists and decide whether the pair needs fetching
    fn prepare_pair(&mut self, user_id: i64, date: NaiveDate, metric: MetricType) -> Result<bool> {
        self.db
            .create_sync_status(user_id, date, metric, SyncStatus::Pending)?;

        match self.db.get_sync_status(user_id, date, metric)? {
            Some(SyncStatus::Pending) => Ok(true),
            Some(SyncStatus::Failed) if self.config.retry_failed => {
                self.db
                    .update_sync_status(user_id, date, metric, SyncStatus::Pending)?;
                Ok(true)
            }
            Some(status) => {
                tracing::debug!(user_id, %date, %metric, %status, "Skipping");
                Ok(false)
            }
            None => Err(LocalDbError::UnknownKey {
                user_id,
                date,
                metric,
            }),
        }
    }

    async fn sync_pair(
        &mut self,
        user_id: i64,
        date: NaiveDate,
        metric: MetricType,
    ) -> Result<PairOutcome> {
        match metric.storage_kind() {
            StorageKind::Activities => self.sync_activities(user_id, date).await,
            StorageKind::TimeSeries | StorageKind::Daily => {
                let raw = self.source.fetch_metric(metric, date).await?;
                let data = self.extractor.extract_metric_data(&raw, metric)?;
                self.store(user_id, date, metric, data)
            }
        }
    }

    async fn sync_activities(&mut self, user_id: i64, date: NaiveDate) -> Result<PairOutcome> {
        if !self.activities_ready {
            self.activities.initialize().await?;
            self.activities_ready = true;
        }

        let raw_activities = self.activities.get_activities_for_date(date).await?;
        let mut outcome = PairOutcome::default();
        for raw in &raw_activities {
            let data = self
                .extractor
                .extract_metric_data(raw, MetricType::Activities)?;
            let stored = self.store(user_id, date, MetricType::Activities, data)?;
            outcome.activities += stored.activities;
        }
        Ok(outcome)
    }

    fn store(
        &mut self,
        user_id: i64,
        date: NaiveDate,
        metric: MetricType,
        data: MetricData,
    ) -> Result<PairOutcome> {
        let mut outcome = PairOutcome::default();
        match data {
            MetricData::Empty => {
                tracing::debug!(user_id, %date, %metric, "No data");
            }
            MetricData::Activity(fields) => {
                let record = ActivityRecord::from_fields(fields)?;
                self.db.store_activity(user_id, &record)?;
                outcome.activities = 1;
            }
            MetricData::Daily(fields) => {
                if !fields.is_empty() {
                    self.db.store_health_metric(user_id, date, &fields)?;
                }
            }
            MetricData::TimeSeries { samples, daily } => {
                let inserted = self.db.with_session(|session| {
                    let inserted = session.store_timeseries_batch(user_id, metric, &samples)?;
                    if !daily.is_empty() {
                        session.store_health_metric(user_id, date, &daily)?;
                    }
                    Ok(inserted)
                })?;
                outcome.samples = inserted as u32;
            }
        }
        Ok(outcome)
    }
}
