//! SQLite-backed local store for Garmin health data
//!
//! Holds time-series samples, activities and daily health metrics. Every write
//! runs inside one [`Session`] and is shaped as an insert-or-skip or an upsert,
//! so a sync that is re-run after a partial failure never duplicates rows.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;

use crate::db::models::{
    Activity, ActivityRecord, Attributes, DailyHealthMetric, HealthMetricFields, MetricType,
    TimeSeriesSample,
};
use crate::db::schema::{self, ColumnDef, ColumnType, SchemaInfo, DAILY_HEALTH_METRICS};
use crate::error::{query_err, write_err, LocalDbError, Result};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Local store owning a single SQLite database file
pub struct HealthDb {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for HealthDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HealthDb {
    /// Open or create the store at `path`, creating the schema if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let init_err = |reason: String| LocalDbError::StoreInit {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| init_err(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(&path).map_err(|e| init_err(e.to_string()))?;

        // WAL keeps readers unblocked while a sync writes
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| init_err(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| init_err(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| init_err(e.to_string()))?;

        schema::migrate(&conn, &path)?;
        tracing::debug!(path = %path.display(), "Opened health database");

        Ok(Self { conn, path })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|e| LocalDbError::StoreInit {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        schema::migrate(&conn, &path)?;
        Ok(Self { conn, path })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transactional scope.
    ///
    /// The session commits only through [`Session::commit`]; dropping it on any
    /// other path rolls back. It borrows the store mutably, so only one can be
    /// active per handle.
    pub fn scoped_session(&mut self) -> Result<Session<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_err("Failed to begin transaction"))?;
        Ok(Session { tx })
    }

    /// Run `f` in a session, committing when it returns `Ok` and rolling back otherwise
    pub fn with_session<T>(&mut self, f: impl FnOnce(&Session<'_>) -> Result<T>) -> Result<T> {
        let session = self.scoped_session()?;
        match f(&session) {
            Ok(out) => {
                session.commit()?;
                Ok(out)
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback() {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    pub fn get_schema_info(&self) -> SchemaInfo {
        schema::describe(&self.path)
    }

    pub fn validate_schema(&self) -> Result<bool> {
        schema::validate(&self.conn)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert samples, skipping any whose (user, metric, timestamp) already exists.
    ///
    /// Returns the number of new rows.
    pub fn store_timeseries_batch(
        &mut self,
        user_id: i64,
        metric_type: MetricType,
        records: &[TimeSeriesSample],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.with_session(|s| s.store_timeseries_batch(user_id, metric_type, records))
    }

    /// Insert or update an activity keyed on (user, activity_id)
    pub fn store_activity(&mut self, user_id: i64, record: &ActivityRecord) -> Result<()> {
        record.validate()?;
        self.with_session(|s| s.store_activity(user_id, record))
    }

    /// Insert or merge the daily row keyed on (user, date)
    pub fn store_health_metric(
        &mut self,
        user_id: i64,
        metric_date: NaiveDate,
        fields: &HealthMetricFields,
    ) -> Result<()> {
        self.with_session(|s| s.store_health_metric(user_id, metric_date, fields))
    }

    // =========================================================================
    // Existence checks
    // =========================================================================

    pub fn activity_exists(&self, user_id: i64, activity_id: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM activities WHERE user_id = ? AND activity_id = ?)",
                params![user_id, activity_id],
                |row| row.get(0),
            )
            .map_err(query_err("Failed to check activity"))
    }

    pub fn health_metric_exists(&self, user_id: i64, metric_date: NaiveDate) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM daily_health_metrics WHERE user_id = ? AND metric_date = ?)",
                params![user_id, format_date(metric_date)],
                |row| row.get(0),
            )
            .map_err(query_err("Failed to check health metric"))
    }

    // =========================================================================
    // Range queries
    // =========================================================================

    /// Daily rows with `start <= metric_date <= end`, ascending by date
    pub fn get_health_metrics(
        &self,
        user_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyHealthMetric>> {
        let sql = format!(
            "SELECT {} FROM daily_health_metrics
             WHERE user_id = ? AND metric_date BETWEEN ? AND ?
             ORDER BY metric_date ASC",
            health_select_columns()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(query_err("Failed to prepare health metric query"))?;

        let rows: Vec<RawHealthRow> = stmt
            .query_map(
                params![user_id, format_date(start_date), format_date(end_date)],
                read_health_row,
            )
            .and_then(|rows| rows.collect())
            .map_err(query_err("Failed to query health metrics"))?;

        rows.into_iter().map(RawHealthRow::into_metric).collect()
    }

    pub fn get_health_metric(
        &self,
        user_id: i64,
        metric_date: NaiveDate,
    ) -> Result<Option<DailyHealthMetric>> {
        let sql = format!(
            "SELECT {} FROM daily_health_metrics WHERE user_id = ? AND metric_date = ?",
            health_select_columns()
        );
        self.conn
            .query_row(&sql, params![user_id, format_date(metric_date)], read_health_row)
            .optional()
            .map_err(query_err("Failed to get health metric"))?
            .map(RawHealthRow::into_metric)
            .transpose()
    }

    /// Activities with `start <= activity_date <= end`, ascending by date
    pub fn get_activities(
        &self,
        user_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM activities
                 WHERE user_id = ? AND activity_date BETWEEN ? AND ?
                 ORDER BY activity_date ASC, start_time ASC, id ASC",
                ACTIVITY_COLUMNS
            ))
            .map_err(query_err("Failed to prepare activity query"))?;

        let rows = stmt
            .query_map(
                params![user_id, format_date(start_date), format_date(end_date)],
                read_activity_row,
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(query_err("Failed to query activities"))?;

        Ok(rows)
    }

    pub fn get_activity(&self, user_id: i64, activity_id: &str) -> Result<Option<Activity>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM activities WHERE user_id = ? AND activity_id = ?",
                    ACTIVITY_COLUMNS
                ),
                params![user_id, activity_id],
                read_activity_row,
            )
            .optional()
            .map_err(query_err("Failed to get activity"))
    }

    /// Samples with `start <= timestamp <= end`, ascending by timestamp
    pub fn get_timeseries(
        &self,
        user_id: i64,
        metric_type: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesSample>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT timestamp, value, attributes FROM timeseries
                 WHERE user_id = ? AND metric_type = ? AND timestamp BETWEEN ? AND ?
                 ORDER BY timestamp ASC",
            )
            .map_err(query_err("Failed to prepare timeseries query"))?;

        let rows = stmt
            .query_map(
                params![
                    user_id,
                    metric_type.as_str(),
                    bound_key(start),
                    bound_key(end)
                ],
                |row| {
                    Ok(TimeSeriesSample {
                        timestamp: Utc.timestamp_nanos(row.get(0)?),
                        value: row.get(1)?,
                        attributes: json_column(row, 2)?,
                    })
                },
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(query_err("Failed to query timeseries"))?;

        Ok(rows)
    }

    pub fn count_timeseries(
        &self,
        user_id: i64,
        metric_type: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM timeseries
                 WHERE user_id = ? AND metric_type = ? AND timestamp BETWEEN ? AND ?",
                params![
                    user_id,
                    metric_type.as_str(),
                    bound_key(start),
                    bound_key(end)
                ],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(query_err("Failed to count timeseries"))
    }
}

/// One active transaction against a [`HealthDb`]
pub struct Session<'a> {
    tx: Transaction<'a>,
}

impl Session<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit().map_err(write_err("Failed to commit"))
    }

    /// Discard every write made in this session
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback().map_err(write_err("Failed to roll back"))
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub fn store_timeseries_batch(
        &self,
        user_id: i64,
        metric_type: MetricType,
        records: &[TimeSeriesSample],
    ) -> Result<usize> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "INSERT INTO timeseries (user_id, metric_type, timestamp, value, attributes)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, metric_type, timestamp) DO NOTHING",
            )
            .map_err(write_err("Failed to prepare timeseries insert"))?;

        let mut inserted = 0;
        for record in records {
            // NaN would be stored as NULL in the NOT NULL value column
            if !record.value.is_finite() {
                return Err(LocalDbError::write(format!(
                    "Non-finite {} value at {}",
                    metric_type, record.timestamp
                )));
            }
            inserted += stmt
                .execute(params![
                    user_id,
                    metric_type.as_str(),
                    timestamp_key(record.timestamp)?,
                    record.value,
                    serde_json::to_string(&record.attributes)?,
                ])
                .map_err(write_err("Failed to insert timeseries sample"))?;
        }

        tracing::debug!(
            user_id,
            metric = %metric_type,
            received = records.len(),
            inserted,
            "Stored timeseries batch"
        );
        Ok(inserted)
    }

    pub fn store_activity(&self, user_id: i64, record: &ActivityRecord) -> Result<()> {
        record.validate()?;

        self.tx
            .execute(
                "INSERT INTO activities (
                     user_id, activity_id, activity_date, activity_name, activity_type,
                     start_time, duration_seconds, distance_meters, calories,
                     avg_heart_rate, max_heart_rate, training_load, attributes
                 )
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, activity_id) DO UPDATE SET
                     activity_date = excluded.activity_date,
                     activity_name = excluded.activity_name,
                     activity_type = excluded.activity_type,
                     start_time = excluded.start_time,
                     duration_seconds = excluded.duration_seconds,
                     distance_meters = excluded.distance_meters,
                     calories = excluded.calories,
                     avg_heart_rate = excluded.avg_heart_rate,
                     max_heart_rate = excluded.max_heart_rate,
                     training_load = excluded.training_load,
                     attributes = excluded.attributes,
                     synced_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
                params![
                    user_id,
                    record.activity_id,
                    format_date(record.activity_date),
                    record.activity_name,
                    record.activity_type,
                    record.start_time.map(|t| t.to_rfc3339()),
                    record.duration_seconds,
                    record.distance_meters,
                    record.calories,
                    record.avg_heart_rate,
                    record.max_heart_rate,
                    record.training_load,
                    serde_json::to_string(&record.attributes)?,
                ],
            )
            .map_err(write_err("Failed to store activity"))?;

        tracing::debug!(user_id, activity_id = %record.activity_id, "Stored activity");
        Ok(())
    }

    pub fn store_health_metric(
        &self,
        user_id: i64,
        metric_date: NaiveDate,
        fields: &HealthMetricFields,
    ) -> Result<()> {
        let (values, extra) = health_column_values(fields)?;

        // Each top-level extra key replaces its whole stored value; keys not sent are kept
        let mut merged_extra = self
            .tx
            .query_row(
                "SELECT extra FROM daily_health_metrics WHERE user_id = ? AND metric_date = ?",
                params![user_id, format_date(metric_date)],
                |row| json_column(row, 0),
            )
            .optional()
            .map_err(write_err("Failed to read stored extra fields"))?
            .unwrap_or_default();
        merged_extra.extend(extra);

        let field_names: Vec<&str> = DAILY_HEALTH_METRICS.field_columns().map(|c| c.name).collect();
        let placeholders = vec!["?"; field_names.len() + 3].join(", ");
        let merges: Vec<String> = field_names
            .iter()
            .map(|name| format!("{name} = COALESCE(excluded.{name}, {name})"))
            .collect();

        let sql = format!(
            "INSERT INTO daily_health_metrics (user_id, metric_date, {}, extra)
             VALUES ({})
             ON CONFLICT (user_id, metric_date) DO UPDATE SET
                 {},
                 extra = excluded.extra,
                 synced_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
            field_names.join(", "),
            placeholders,
            merges.join(",\n                 ")
        );

        let mut params: Vec<SqlValue> = Vec::with_capacity(values.len() + 3);
        params.push(SqlValue::Integer(user_id));
        params.push(SqlValue::Text(format_date(metric_date)));
        params.extend(values);
        params.push(SqlValue::Text(serde_json::to_string(&merged_extra)?));

        self.tx
            .execute(&sql, params_from_iter(params))
            .map_err(write_err("Failed to store health metric"))?;

        tracing::debug!(user_id, date = %metric_date, "Stored daily health metric");
        Ok(())
    }
}

/// Storage key for a sample timestamp: nanoseconds since the Unix epoch
fn timestamp_key(timestamp: DateTime<Utc>) -> Result<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        LocalDbError::validation(format!("Timestamp {} is outside the storable range", timestamp))
    })
}

/// Range bound for timestamp queries, clamped to the storable range
fn bound_key(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_nanos_opt().unwrap_or(if timestamp.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

pub(crate) fn conversion_error(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, msg.into())
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Attributes> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(Attributes::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

const ACTIVITY_COLUMNS: &str = "user_id, activity_id, activity_date, activity_name, activity_type,
     start_time, duration_seconds, distance_meters, calories, avg_heart_rate,
     max_heart_rate, training_load, attributes";

fn read_activity_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let start_time = row
        .get::<_, Option<String>>(5)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_error(5, Type::Text, e.to_string()))
        })
        .transpose()?;

    Ok(Activity {
        user_id: row.get(0)?,
        record: ActivityRecord {
            activity_id: row.get(1)?,
            activity_date: parse_date_column(row, 2)?,
            activity_name: row.get(3)?,
            activity_type: row.get(4)?,
            start_time,
            duration_seconds: row.get(6)?,
            distance_meters: row.get(7)?,
            calories: row.get(8)?,
            avg_heart_rate: row.get(9)?,
            max_heart_rate: row.get(10)?,
            training_load: row.get(11)?,
            attributes: json_column(row, 12)?,
        },
    })
}

fn health_select_columns() -> String {
    let fields: Vec<&str> = DAILY_HEALTH_METRICS.field_columns().map(|c| c.name).collect();
    format!("user_id, metric_date, {}, extra", fields.join(", "))
}

/// Row as read from SQLite, before field decoding
struct RawHealthRow {
    user_id: i64,
    metric_date: NaiveDate,
    values: Vec<SqlValue>,
    extra: Attributes,
}

fn read_health_row(row: &Row<'_>) -> rusqlite::Result<RawHealthRow> {
    let field_count = DAILY_HEALTH_METRICS.field_columns().count();
    let values = (0..field_count)
        .map(|i| row.get::<_, SqlValue>(i + 2))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(RawHealthRow {
        user_id: row.get(0)?,
        metric_date: parse_date_column(row, 1)?,
        values,
        extra: json_column(row, field_count + 2)?,
    })
}

impl RawHealthRow {
    fn into_metric(self) -> Result<DailyHealthMetric> {
        let mut map = self.extra;
        for (column, value) in DAILY_HEALTH_METRICS.field_columns().zip(self.values) {
            let json = match value {
                SqlValue::Null => continue,
                SqlValue::Integer(i) => Value::from(i),
                SqlValue::Real(f) => match serde_json::Number::from_f64(f) {
                    Some(n) => Value::Number(n),
                    None => continue,
                },
                SqlValue::Text(s) => Value::String(s),
                SqlValue::Blob(_) => {
                    return Err(LocalDbError::Query(format!(
                        "Unexpected blob in {}",
                        column.name
                    )));
                }
            };
            map.insert(column.name.to_string(), json);
        }

        let fields: HealthMetricFields = serde_json::from_value(Value::Object(map))
            .map_err(|e| LocalDbError::Query(format!("Failed to decode health metric: {}", e)))?;

        Ok(DailyHealthMetric {
            user_id: self.user_id,
            metric_date: self.metric_date,
            fields,
        })
    }
}

/// Split fields into column values (declared order) and the extra side-channel
fn health_column_values(fields: &HealthMetricFields) -> Result<(Vec<SqlValue>, Attributes)> {
    let Value::Object(mut map) = serde_json::to_value(fields)? else {
        return Err(LocalDbError::validation("Health metric fields must be an object"));
    };

    let values = DAILY_HEALTH_METRICS
        .field_columns()
        .map(|column| to_sql_value(column, map.remove(column.name)))
        .collect::<Result<Vec<_>>>()?;

    // A null extra value means unspecified, same as an absent key
    map.retain(|_, v| !v.is_null());
    Ok((values, map))
}

fn to_sql_value(column: &ColumnDef, value: Option<Value>) -> Result<SqlValue> {
    let value = match value {
        None | Some(Value::Null) => return Ok(SqlValue::Null),
        Some(value) => value,
    };

    let converted = match column.column_type {
        ColumnType::Integer => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.round() as i64))
            .map(SqlValue::Integer),
        ColumnType::Real => value.as_f64().map(SqlValue::Real),
        ColumnType::Text => value.as_str().map(|s| SqlValue::Text(s.to_string())),
    };

    converted.ok_or_else(|| {
        LocalDbError::validation(format!(
            "Field {} expects {}, got {}",
            column.name,
            column.column_type.sql(),
            value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_session_rolls_back_when_dropped() {
        let mut db = HealthDb::open_in_memory().unwrap();
        {
            let session = db.scoped_session().unwrap();
            session
                .store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)))
                .unwrap();
        }
        assert!(!db.activity_exists(1, "1").unwrap());
    }

    #[test]
    fn test_with_session_rolls_back_on_error() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let result: Result<()> = db.with_session(|s| {
            s.store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)))?;
            Err(LocalDbError::write("simulated failure"))
        });
        assert!(result.is_err());
        assert!(!db.activity_exists(1, "1").unwrap());
    }

    #[test]
    fn test_session_groups_writes() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let session = db.scoped_session().unwrap();
        session
            .store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)))
            .unwrap();
        session
            .store_health_metric(1, date(2023, 1, 1), &HealthMetricFields::default())
            .unwrap();
        session.commit().unwrap();

        assert!(db.activity_exists(1, "1").unwrap());
        assert!(db.health_metric_exists(1, date(2023, 1, 1)).unwrap());
    }

    #[test]
    fn test_timeseries_batch_rejects_non_finite_atomically() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
        let samples = vec![
            TimeSeriesSample::new(t0, 80.0),
            TimeSeriesSample::new(t0 + chrono::Duration::minutes(1), f64::NAN),
        ];

        let result = db.store_timeseries_batch(1, MetricType::HeartRate, &samples);
        assert!(matches!(result, Err(LocalDbError::StoreWrite(_))));
        assert_eq!(
            db.count_timeseries(1, MetricType::HeartRate, t0, t0 + chrono::Duration::hours(1))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_health_metric_merges_fields_and_extra() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let day = date(2023, 1, 1);

        let mut first = HealthMetricFields {
            total_steps: Some(1000),
            ..Default::default()
        };
        first.extra.insert("floors_climbed".into(), json!(4));
        db.store_health_metric(1, day, &first).unwrap();

        let mut second = HealthMetricFields {
            resting_heart_rate: Some(51),
            hrv_status: Some("BALANCED".into()),
            ..Default::default()
        };
        second.extra.insert("hydration_ml".into(), json!(1500));
        db.store_health_metric(1, day, &second).unwrap();

        let stored = db.get_health_metric(1, day).unwrap().unwrap();
        assert_eq!(stored.fields.total_steps, Some(1000));
        assert_eq!(stored.fields.resting_heart_rate, Some(51));
        assert_eq!(stored.fields.hrv_status.as_deref(), Some("BALANCED"));
        assert_eq!(stored.fields.extra.get("floors_climbed"), Some(&json!(4)));
        assert_eq!(stored.fields.extra.get("hydration_ml"), Some(&json!(1500)));
    }

    #[test]
    fn test_activity_attributes_round_trip() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let mut record = ActivityRecord::new("99", date(2023, 1, 1)).with_name("Swim");
        record.start_time = Some(Utc.with_ymd_and_hms(2023, 1, 1, 7, 0, 0).unwrap());
        record.attributes.insert("pool_length".into(), json!(25));
        db.store_activity(7, &record).unwrap();

        let stored = db.get_activity(7, "99").unwrap().unwrap();
        assert_eq!(stored.user_id, 7);
        assert_eq!(stored.record, record);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("health.db");
        let db = HealthDb::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path.as_path());
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("health.db");
        std::fs::write(&path, vec![0x5a_u8; 4096]).unwrap();

        let result = HealthDb::open(&path);
        assert!(matches!(result, Err(LocalDbError::StoreInit { .. })));
    }
}
