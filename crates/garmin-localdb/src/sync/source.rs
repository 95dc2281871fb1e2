//! Collaborator boundary consumed by [`SyncManager`](super::SyncManager)

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::db::models::{Attributes, HealthMetricFields, MetricType, TimeSeriesSample};
use crate::error::Result;

/// Fetches raw data for one metric on one day
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Raw response for `metric` on `date`.
    ///
    /// A day with no data should come back as an empty object, not an error.
    async fn fetch_metric(&self, metric: MetricType, date: NaiveDate) -> Result<Value>;
}

/// Enumerates the raw activity objects recorded on a day
#[async_trait]
pub trait ActivitiesIterator: Send + Sync {
    /// Prepare for iteration (authentication checks, session setup)
    async fn initialize(&mut self) -> Result<()>;

    async fn get_activities_for_date(&self, date: NaiveDate) -> Result<Vec<Value>>;
}

/// Maps a raw API object onto storage-ready data
pub trait DataExtractor: Send + Sync {
    fn extract_metric_data(&self, raw: &Value, metric: MetricType) -> Result<MetricData>;
}

/// Storage-ready data for one (date, metric) fetch
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    /// Field mapping for one activity, fed to `ActivityRecord::from_fields`
    Activity(Attributes),
    /// Daily aggregate fields
    Daily(HealthMetricFields),
    /// Intraday samples plus any daily aggregates found alongside them
    TimeSeries {
        samples: Vec<TimeSeriesSample>,
        daily: HealthMetricFields,
    },
    /// Nothing recorded for this day
    Empty,
}

impl MetricData {
    pub fn is_empty(&self) -> bool {
        match self {
            MetricData::Empty => true,
            MetricData::Activity(fields) => fields.is_empty(),
            MetricData::Daily(fields) => fields.is_empty(),
            MetricData::TimeSeries { samples, daily } => samples.is_empty() && daily.is_empty(),
        }
    }
}
