//! Declarative schema for the local store
//!
//! The table definitions below are the single source of truth for column names,
//! column types and uniqueness constraints. DDL is generated from them and
//! [`validate`] checks a live database against them.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{LocalDbError, Result};

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// What a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Part of the entity key
    Key,
    /// A named data field
    Field,
    /// JSON side-channel for open attributes
    Attributes,
    /// Bookkeeping maintained by the store
    Meta,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub default: Option<&'static str>,
    pub role: ColumnRole,
}

const fn key(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        column_type,
        not_null: true,
        default: None,
        role: ColumnRole::Key,
    }
}

const fn field(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        column_type,
        not_null: false,
        default: None,
        role: ColumnRole::Field,
    }
}

const fn required(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        column_type,
        not_null: true,
        default: None,
        role: ColumnRole::Field,
    }
}

const fn attributes(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        column_type: ColumnType::Text,
        not_null: true,
        default: Some("'{}'"),
        role: ColumnRole::Attributes,
    }
}

const fn timestamp(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        column_type: ColumnType::Text,
        not_null: true,
        default: Some("(strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))"),
        role: ColumnRole::Meta,
    }
}

/// A persisted entity table
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub unique_key: &'static [&'static str],
    pub indexes: &'static [(&'static str, &'static [&'static str])],
}

pub const TIMESERIES: TableDef = TableDef {
    name: "timeseries",
    columns: &[
        key("user_id", ColumnType::Integer),
        key("metric_type", ColumnType::Text),
        key("timestamp", ColumnType::Integer),
        required("value", ColumnType::Real),
        attributes("attributes"),
        timestamp("synced_at"),
    ],
    unique_key: &["user_id", "metric_type", "timestamp"],
    indexes: &[],
};

pub const ACTIVITIES: TableDef = TableDef {
    name: "activities",
    columns: &[
        key("user_id", ColumnType::Integer),
        key("activity_id", ColumnType::Text),
        required("activity_date", ColumnType::Text),
        field("activity_name", ColumnType::Text),
        field("activity_type", ColumnType::Text),
        field("start_time", ColumnType::Text),
        field("duration_seconds", ColumnType::Real),
        field("distance_meters", ColumnType::Real),
        field("calories", ColumnType::Integer),
        field("avg_heart_rate", ColumnType::Integer),
        field("max_heart_rate", ColumnType::Integer),
        field("training_load", ColumnType::Real),
        attributes("attributes"),
        timestamp("synced_at"),
    ],
    unique_key: &["user_id", "activity_id"],
    indexes: &[("idx_activities_date", &["user_id", "activity_date"])],
};

pub const DAILY_HEALTH_METRICS: TableDef = TableDef {
    name: "daily_health_metrics",
    columns: &[
        key("user_id", ColumnType::Integer),
        key("metric_date", ColumnType::Text),
        field("total_steps", ColumnType::Integer),
        field("step_goal", ColumnType::Integer),
        field("total_distance_meters", ColumnType::Real),
        field("total_calories", ColumnType::Integer),
        field("active_calories", ColumnType::Integer),
        field("bmr_calories", ColumnType::Integer),
        field("resting_heart_rate", ColumnType::Integer),
        field("max_heart_rate", ColumnType::Integer),
        field("min_heart_rate", ColumnType::Integer),
        field("average_heart_rate", ColumnType::Integer),
        field("avg_stress_level", ColumnType::Integer),
        field("max_stress_level", ColumnType::Integer),
        field("body_battery_high", ColumnType::Integer),
        field("body_battery_low", ColumnType::Integer),
        field("sleep_duration_hours", ColumnType::Real),
        field("deep_sleep_hours", ColumnType::Real),
        field("light_sleep_hours", ColumnType::Real),
        field("rem_sleep_hours", ColumnType::Real),
        field("awake_sleep_hours", ColumnType::Real),
        field("sleep_score", ColumnType::Integer),
        field("training_readiness_score", ColumnType::Integer),
        field("training_readiness_level", ColumnType::Text),
        field("hrv_weekly_avg", ColumnType::Real),
        field("hrv_last_night_avg", ColumnType::Real),
        field("hrv_status", ColumnType::Text),
        field("average_respiration", ColumnType::Real),
        attributes("extra"),
        timestamp("synced_at"),
    ],
    unique_key: &["user_id", "metric_date"],
    indexes: &[],
};

pub const SYNC_STATUS: TableDef = TableDef {
    name: "sync_status",
    columns: &[
        key("user_id", ColumnType::Integer),
        key("sync_date", ColumnType::Text),
        key("metric_type", ColumnType::Text),
        required("status", ColumnType::Text),
        timestamp("created_at"),
        timestamp("updated_at"),
    ],
    unique_key: &["user_id", "sync_date", "metric_type"],
    indexes: &[("idx_sync_status_pending", &["user_id", "sync_date", "status"])],
};

/// Every entity table, in creation order
pub const TABLES: [&TableDef; 4] = [&TIMESERIES, &ACTIVITIES, &DAILY_HEALTH_METRICS, &SYNC_STATUS];

impl TableDef {
    /// Columns that hold named data fields
    pub fn field_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.role == ColumnRole::Field)
    }

    pub fn create_sql(&self) -> String {
        let mut parts = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for column in self.columns {
            let mut def = format!("{} {}", column.name, column.column_type.sql());
            if column.not_null {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = column.default {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
            parts.push(def);
        }
        parts.push(format!("UNIQUE ({})", self.unique_key.join(", ")));

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|(name, columns)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    name,
                    self.name,
                    columns.join(", ")
                )
            })
            .collect()
    }
}

/// Table names and backing file, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaInfo {
    pub tables: Vec<String>,
    pub db_path: PathBuf,
}

/// Describe the declared schema for a store at `path`
pub fn describe(path: &Path) -> SchemaInfo {
    SchemaInfo {
        tables: TABLES.iter().map(|t| t.name.to_string()).collect(),
        db_path: path.to_path_buf(),
    }
}

fn init_err(path: &Path) -> impl FnOnce(rusqlite::Error) -> LocalDbError + '_ {
    move |e| LocalDbError::StoreInit {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Create or upgrade the schema.
///
/// Idempotent: an already-initialized database is left untouched.
pub(crate) fn migrate(conn: &Connection, path: &Path) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(init_err(path))?;

    if current_version > SCHEMA_VERSION {
        return Err(LocalDbError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    let mut ddl = String::new();
    if current_version == 0 {
        for table in TABLES {
            ddl.push_str(&table.create_sql());
            ddl.push_str(";\n");
            for index in table.index_sql() {
                ddl.push_str(&index);
                ddl.push_str(";\n");
            }
        }
    } else if current_version < 2 {
        // v1 keyed samples by epoch milliseconds
        ddl.push_str("UPDATE timeseries SET timestamp = timestamp * 1000000;\n");
    }
    ddl.push_str(&format!("PRAGMA user_version = {};\n", SCHEMA_VERSION));

    conn.execute_batch(&format!("BEGIN;\n{}COMMIT;", ddl))
        .map_err(init_err(path))?;

    tracing::debug!(
        from = current_version,
        to = SCHEMA_VERSION,
        path = %path.display(),
        "Migrated store schema"
    );
    Ok(())
}

/// Check that the live database matches the declared tables.
///
/// Returns `Ok(false)` with a warning for the first mismatch found.
pub fn validate(conn: &Connection) -> Result<bool> {
    for table in TABLES {
        if let Some(problem) = check_table(conn, table)? {
            tracing::warn!(table = table.name, "Schema mismatch: {}", problem);
            return Ok(false);
        }
    }
    Ok(true)
}

fn check_table(conn: &Connection, table: &TableDef) -> Result<Option<String>> {
    let mut stmt = conn
        .prepare(r#"SELECT name, type, "notnull" FROM pragma_table_info(?1)"#)
        .map_err(|e| LocalDbError::Query(format!("Failed to inspect {}: {}", table.name, e)))?;

    let live: Vec<(String, String, bool)> = stmt
        .query_map(params![table.name], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .and_then(|rows| rows.collect())
        .map_err(|e| LocalDbError::Query(format!("Failed to inspect {}: {}", table.name, e)))?;

    if live.is_empty() {
        return Ok(Some("table is missing".to_string()));
    }

    for column in table.columns {
        match live.iter().find(|(name, _, _)| name == column.name) {
            None => return Ok(Some(format!("column {} is missing", column.name))),
            Some((_, ty, not_null)) => {
                if !ty.eq_ignore_ascii_case(column.column_type.sql()) {
                    return Ok(Some(format!(
                        "column {} has type {}, expected {}",
                        column.name,
                        ty,
                        column.column_type.sql()
                    )));
                }
                if *not_null != column.not_null {
                    return Ok(Some(format!("column {} nullability differs", column.name)));
                }
            }
        }
    }

    if !has_unique_index(conn, table)? {
        return Ok(Some(format!(
            "unique constraint on ({}) is missing",
            table.unique_key.join(", ")
        )));
    }

    Ok(None)
}

fn has_unique_index(conn: &Connection, table: &TableDef) -> Result<bool> {
    let query_err =
        |e: rusqlite::Error| LocalDbError::Query(format!("Failed to inspect indexes: {}", e));

    let mut list = conn
        .prepare(r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1"#)
        .map_err(query_err)?;
    let indexes: Vec<String> = list
        .query_map(params![table.name], |row| row.get(0))
        .and_then(|rows| rows.collect())
        .map_err(query_err)?;

    let mut info = conn
        .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
        .map_err(query_err)?;
    for index in indexes {
        let columns: Vec<String> = info
            .query_map(params![index], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(query_err)?;
        if columns.iter().map(String::as_str).eq(table.unique_key.iter().copied()) {
            return Ok(true);
        }
    }
    Ok(false)
}
