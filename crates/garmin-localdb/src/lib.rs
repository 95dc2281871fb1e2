//! Local durable mirror of Garmin Connect health data.
//!
//! [`HealthDb`] stores time-series samples, activities and daily metrics in a
//! single SQLite file and tracks per-(user, date, metric) sync state.
//! [`SyncManager`] drives fetches through pluggable collaborators and records
//! the outcome of every pair, so an interrupted run can simply be started again.

pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod storage;
pub mod sync;

pub use db::models::{
    Activity, ActivityRecord, Attributes, DailyHealthMetric, HealthMetricFields, MetricType,
    StorageKind, SyncStatus, SyncStatusCounts, SyncStatusRecord, TimeSeriesSample,
};
pub use db::SchemaInfo;
pub use error::{LocalDbError, Result};
pub use storage::{HealthDb, Session};
pub use sync::{SyncManager, SyncStats};
