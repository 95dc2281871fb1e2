//! Entity models persisted by the local store
//!
//! All values returned from queries are detached copies; nothing here holds a
//! handle into the database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LocalDbError, Result};

/// Free-form attributes stored alongside fixed columns as JSON text
pub type Attributes = serde_json::Map<String, Value>;

/// How a metric type is laid out in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Individual activity rows in `activities`
    Activities,
    /// Intraday samples in `timeseries`, plus daily aggregates
    TimeSeries,
    /// One row per day in `daily_health_metrics`
    Daily,
}

/// Closed set of health signals tracked by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    DailySummary,
    Sleep,
    Activities,
    BodyBattery,
    Stress,
    HeartRate,
    TrainingReadiness,
    Hrv,
    Respiration,
    Steps,
    Calories,
}

impl MetricType {
    pub const ALL: [MetricType; 11] = [
        MetricType::DailySummary,
        MetricType::Sleep,
        MetricType::Activities,
        MetricType::BodyBattery,
        MetricType::Stress,
        MetricType::HeartRate,
        MetricType::TrainingReadiness,
        MetricType::Hrv,
        MetricType::Respiration,
        MetricType::Steps,
        MetricType::Calories,
    ];

    /// Stable discriminator stored in `timeseries.metric_type` and `sync_status.metric_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::DailySummary => "daily_summary",
            MetricType::Sleep => "sleep",
            MetricType::Activities => "activities",
            MetricType::BodyBattery => "body_battery",
            MetricType::Stress => "stress",
            MetricType::HeartRate => "heart_rate",
            MetricType::TrainingReadiness => "training_readiness",
            MetricType::Hrv => "hrv",
            MetricType::Respiration => "respiration",
            MetricType::Steps => "steps",
            MetricType::Calories => "calories",
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        match self {
            MetricType::Activities => StorageKind::Activities,
            MetricType::HeartRate
            | MetricType::Stress
            | MetricType::BodyBattery
            | MetricType::Respiration => StorageKind::TimeSeries,
            MetricType::DailySummary
            | MetricType::Sleep
            | MetricType::TrainingReadiness
            | MetricType::Hrv
            | MetricType::Steps
            | MetricType::Calories => StorageKind::Daily,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = LocalDbError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| LocalDbError::validation(format!("Unknown metric type: {}", s)))
    }
}

/// Fetch state of one (user, date, metric) slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    /// `Success` and `Completed` label the same terminal state
    pub fn is_success(&self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Completed)
    }

    /// Decide whether moving to `to` writes anything.
    ///
    /// Returns `Ok(true)` when the row must change, `Ok(false)` for an idempotent
    /// re-entry into the current terminal state. `Failed -> Pending` is the one
    /// move allowed out of a terminal state; it is how a failed pair is retried.
    pub fn check_transition(self, to: SyncStatus) -> Result<bool> {
        match (self, to) {
            (SyncStatus::Pending, SyncStatus::Pending) => Ok(false),
            (SyncStatus::Pending, _) => Ok(true),
            (from, to) if from.is_success() && to.is_success() => Ok(false),
            (SyncStatus::Failed, SyncStatus::Failed) => Ok(false),
            (SyncStatus::Failed, SyncStatus::Pending) => Ok(true),
            (from, to) => Err(LocalDbError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = LocalDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(LocalDbError::validation(format!("Unknown sync status: {}", other))),
        }
    }
}

/// One intraday sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl TimeSeriesSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Storage-ready activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: String,
    pub activity_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_load: Option<f64>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl ActivityRecord {
    pub fn new(activity_id: impl Into<String>, activity_date: NaiveDate) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_date,
            activity_name: None,
            activity_type: None,
            start_time: None,
            duration_seconds: None,
            distance_meters: None,
            calories: None,
            avg_heart_rate: None,
            max_heart_rate: None,
            training_load: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.activity_name = Some(name.into());
        self
    }

    /// Build a record from an open field mapping.
    ///
    /// `activity_id` (string or integer) and `activity_date` (`YYYY-MM-DD`) are
    /// required. Keys without a dedicated column are kept in `attributes`.
    pub fn from_fields(mut fields: Attributes) -> Result<Self> {
        let activity_id = match fields.get("activity_id") {
            None | Some(Value::Null) => {
                return Err(LocalDbError::validation("activity_id is required"));
            }
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(LocalDbError::validation(format!(
                    "activity_id must be a string or integer, got {}",
                    other
                )));
            }
        };
        fields.insert("activity_id".to_string(), Value::String(activity_id));

        let activity_date = match fields.get("activity_date") {
            None | Some(Value::Null) => {
                return Err(LocalDbError::validation("activity_date is required"));
            }
            // Accept "YYYY-MM-DD HH:MM:SS" by keeping the date part
            Some(Value::String(s)) => {
                let day = s.split([' ', 'T']).next().unwrap_or_default();
                Value::String(day.to_string())
            }
            Some(other) => other.clone(),
        };
        fields.insert("activity_date".to_string(), activity_date);

        let record: ActivityRecord = serde_json::from_value(Value::Object(fields))
            .map_err(|e| LocalDbError::validation(format!("Invalid activity fields: {}", e)))?;
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<()> {
        if self.activity_id.trim().is_empty() {
            return Err(LocalDbError::validation("activity_id must not be empty"));
        }
        Ok(())
    }
}

/// Activity row as stored for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub user_id: i64,
    #[serde(flatten)]
    pub record: ActivityRecord,
}

/// Daily aggregate fields. `None` means "not specified" and never overwrites a
/// stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetricFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmr_calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resting_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heart_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_stress_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stress_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_battery_high: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_battery_low: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_duration_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rem_sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awake_sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_readiness_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_readiness_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_weekly_avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_last_night_avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_respiration: Option<f64>,
    /// Fields without a dedicated column
    #[serde(flatten)]
    pub extra: Attributes,
}

impl HealthMetricFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Daily aggregate row as stored for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyHealthMetric {
    pub user_id: i64,
    pub metric_date: NaiveDate,
    #[serde(flatten)]
    pub fields: HealthMetricFields,
}

/// Sync status row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusRecord {
    pub user_id: i64,
    pub sync_date: NaiveDate,
    pub metric_type: MetricType,
    pub status: SyncStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sync status totals for progress reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusCounts {
    pub pending: u32,
    pub success: u32,
    pub completed: u32,
    pub failed: u32,
}

impl SyncStatusCounts {
    pub fn total(&self) -> u32 {
        self.pending + self.success + self.completed + self.failed
    }

    pub(crate) fn add(&mut self, status: SyncStatus, count: u32) {
        match status {
            SyncStatus::Pending => self.pending += count,
            SyncStatus::Success => self.success += count,
            SyncStatus::Completed => self.completed += count,
            SyncStatus::Failed => self.failed += count,
        }
    }
}
