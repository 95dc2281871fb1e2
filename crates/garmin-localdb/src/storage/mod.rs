//! Local store for Garmin health data
//!
//! A single SQLite file holds four tables:
//!
//! ```text
//! ~/.local/share/garmin/health.db
//! ├── timeseries              # intraday samples, unique per (user, metric, timestamp)
//! ├── activities              # one row per (user, activity_id)
//! ├── daily_health_metrics    # one row per (user, date), fields merged on write
//! └── sync_status             # fetch state per (user, date, metric)
//! ```
//!
//! Writes are insert-or-skip or upserts inside one transaction per call, so an
//! interrupted sync can be re-run without duplicating rows.

mod health_db;
mod sync_status;

pub use health_db::{HealthDb, Session};

use std::path::PathBuf;

/// Get the default storage path
pub fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("garmin")
}

/// Get the default health database path
pub fn default_db_path() -> PathBuf {
    default_storage_path().join("health.db")
}
