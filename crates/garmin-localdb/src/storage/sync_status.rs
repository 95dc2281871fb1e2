//! Per-(user, date, metric) sync state tracking

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::health_db::{conversion_error, format_date, parse_date_column, HealthDb};
use crate::db::models::{MetricType, SyncStatus, SyncStatusCounts, SyncStatusRecord};
use crate::error::{query_err, write_err, LocalDbError, Result};

impl HealthDb {
    // =========================================================================
    // Sync Status Operations
    // =========================================================================

    /// Create the status row for a key if it does not exist yet.
    ///
    /// An existing row is left untouched, whatever its status.
    pub fn create_sync_status(
        &mut self,
        user_id: i64,
        sync_date: NaiveDate,
        metric_type: MetricType,
        initial_status: SyncStatus,
    ) -> Result<()> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO sync_status (user_id, sync_date, metric_type, status)
                 VALUES (?, ?, ?, ?)",
                params![
                    user_id,
                    format_date(sync_date),
                    metric_type.as_str(),
                    initial_status.as_str()
                ],
            )
            .map_err(write_err("Failed to create sync status"))?;

        if inserted > 0 {
            tracing::debug!(user_id, date = %sync_date, metric = %metric_type, status = %initial_status, "Created sync status");
        }
        Ok(())
    }

    /// Move an existing key to `new_status`.
    ///
    /// Fails with `UnknownKey` when no row exists and with `InvalidTransition`
    /// when leaving a terminal state. Re-entering the current terminal state
    /// changes nothing.
    pub fn update_sync_status(
        &mut self,
        user_id: i64,
        sync_date: NaiveDate,
        metric_type: MetricType,
        new_status: SyncStatus,
    ) -> Result<()> {
        let date = format_date(sync_date);
        self.with_session(|session| {
            let current: Option<String> = session
                .conn()
                .query_row(
                    "SELECT status FROM sync_status
                     WHERE user_id = ? AND sync_date = ? AND metric_type = ?",
                    params![user_id, date, metric_type.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(query_err("Failed to read sync status"))?;

            let current: SyncStatus = current
                .ok_or(LocalDbError::UnknownKey {
                    user_id,
                    date: sync_date,
                    metric: metric_type,
                })?
                .parse()?;

            if !current.check_transition(new_status)? {
                return Ok(());
            }

            session
                .conn()
                .execute(
                    "UPDATE sync_status
                     SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                     WHERE user_id = ? AND sync_date = ? AND metric_type = ?",
                    params![new_status.as_str(), user_id, date, metric_type.as_str()],
                )
                .map_err(write_err("Failed to update sync status"))?;

            tracing::debug!(user_id, date = %sync_date, metric = %metric_type, from = %current, to = %new_status, "Updated sync status");
            Ok(())
        })
    }

    pub fn get_sync_status(
        &self,
        user_id: i64,
        sync_date: NaiveDate,
        metric_type: MetricType,
    ) -> Result<Option<SyncStatus>> {
        let status: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM sync_status
                 WHERE user_id = ? AND sync_date = ? AND metric_type = ?",
                params![user_id, format_date(sync_date), metric_type.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err("Failed to get sync status"))?;

        status.map(|s| s.parse()).transpose()
    }

    pub fn sync_status_exists(
        &self,
        user_id: i64,
        sync_date: NaiveDate,
        metric_type: MetricType,
    ) -> Result<bool> {
        self.conn()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sync_status
                 WHERE user_id = ? AND sync_date = ? AND metric_type = ?)",
                params![user_id, format_date(sync_date), metric_type.as_str()],
                |row| row.get(0),
            )
            .map_err(query_err("Failed to check sync status"))
    }

    /// Metric types still pending for a user and date, in creation order
    pub fn get_pending_metrics(&self, user_id: i64, sync_date: NaiveDate) -> Result<Vec<MetricType>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT metric_type FROM sync_status
                 WHERE user_id = ? AND sync_date = ? AND status = 'pending'
                 ORDER BY id",
            )
            .map_err(query_err("Failed to prepare pending metrics query"))?;

        let names: Vec<String> = stmt
            .query_map(params![user_id, format_date(sync_date)], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(query_err("Failed to get pending metrics"))?;

        names.iter().map(|name| name.parse()).collect()
    }

    /// Move every failed row for a user back to pending. Returns the number reset.
    ///
    /// Writes the rows directly instead of going through
    /// [`SyncStatus::check_transition`]; only `failed` rows match, and
    /// `Failed -> Pending` is an allowed move.
    pub fn reset_failed_sync_status(&mut self, user_id: i64) -> Result<u32> {
        let count = self
            .conn()
            .execute(
                "UPDATE sync_status
                 SET status = 'pending', updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE user_id = ? AND status = 'failed'",
                params![user_id],
            )
            .map_err(write_err("Failed to reset sync status"))?;

        if count > 0 {
            tracing::info!(user_id, count, "Reset failed sync status to pending");
        }
        Ok(count as u32)
    }

    /// Totals per status over an inclusive date range
    pub fn sync_status_counts(
        &self,
        user_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SyncStatusCounts> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT status, COUNT(*) FROM sync_status
                 WHERE user_id = ? AND sync_date BETWEEN ? AND ?
                 GROUP BY status",
            )
            .map_err(query_err("Failed to prepare status count query"))?;

        let rows: Vec<(String, i64)> = stmt
            .query_map(
                params![user_id, format_date(start_date), format_date(end_date)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .and_then(|rows| rows.collect())
            .map_err(query_err("Failed to count sync status"))?;

        let mut counts = SyncStatusCounts::default();
        for (status, count) in rows {
            counts.add(status.parse()?, count as u32);
        }
        Ok(counts)
    }

    /// All status rows over an inclusive date range, by date then creation order
    pub fn list_sync_status(
        &self,
        user_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SyncStatusRecord>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT user_id, sync_date, metric_type, status, updated_at FROM sync_status
                 WHERE user_id = ? AND sync_date BETWEEN ? AND ?
                 ORDER BY sync_date ASC, id ASC",
            )
            .map_err(query_err("Failed to prepare sync status listing"))?;

        let records = stmt
            .query_map(
                params![user_id, format_date(start_date), format_date(end_date)],
                read_status_row,
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(query_err("Failed to list sync status"))?;

        Ok(records)
    }
}

fn read_status_row(row: &Row<'_>) -> rusqlite::Result<SyncStatusRecord> {
    let metric: String = row.get(2)?;
    let status: String = row.get(3)?;
    let updated_at = row
        .get::<_, Option<String>>(4)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_error(4, Type::Text, e.to_string()))
        })
        .transpose()?;

    Ok(SyncStatusRecord {
        user_id: row.get(0)?,
        sync_date: parse_date_column(row, 1)?,
        metric_type: metric
            .parse()
            .map_err(|e: LocalDbError| conversion_error(2, Type::Text, e.to_string()))?,
        status: status
            .parse()
            .map_err(|e: LocalDbError| conversion_error(3, Type::Text, e.to_string()))?,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn db_with_pending(metric: MetricType) -> HealthDb {
        let mut db = HealthDb::open_in_memory().unwrap();
        db.create_sync_status(1, day(), metric, SyncStatus::Pending)
            .unwrap();
        db
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut db = db_with_pending(MetricType::HeartRate);
        db.update_sync_status(1, day(), MetricType::HeartRate, SyncStatus::Success)
            .unwrap();

        db.create_sync_status(1, day(), MetricType::HeartRate, SyncStatus::Pending)
            .unwrap();
        assert_eq!(
            db.get_sync_status(1, day(), MetricType::HeartRate).unwrap(),
            Some(SyncStatus::Success)
        );
    }

    #[test]
    fn test_update_unknown_key() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let result = db.update_sync_status(1, day(), MetricType::Steps, SyncStatus::Success);
        assert!(matches!(
            result,
            Err(LocalDbError::UnknownKey { user_id: 1, metric: MetricType::Steps, .. })
        ));
        assert!(!db.sync_status_exists(1, day(), MetricType::Steps).unwrap());
    }

    #[test]
    fn test_terminal_reentry_is_noop() {
        let mut db = db_with_pending(MetricType::Activities);
        db.update_sync_status(1, day(), MetricType::Activities, SyncStatus::Completed)
            .unwrap();
        db.update_sync_status(1, day(), MetricType::Activities, SyncStatus::Completed)
            .unwrap();
        db.update_sync_status(1, day(), MetricType::Activities, SyncStatus::Success)
            .unwrap();
        assert_eq!(
            db.get_sync_status(1, day(), MetricType::Activities).unwrap(),
            Some(SyncStatus::Completed)
        );
    }

    #[test]
    fn test_leaving_success_is_rejected() {
        let mut db = db_with_pending(MetricType::Sleep);
        db.update_sync_status(1, day(), MetricType::Sleep, SyncStatus::Completed)
            .unwrap();
        let result = db.update_sync_status(1, day(), MetricType::Sleep, SyncStatus::Failed);
        assert!(matches!(result, Err(LocalDbError::InvalidTransition { .. })));
        assert_eq!(
            db.get_sync_status(1, day(), MetricType::Sleep).unwrap(),
            Some(SyncStatus::Completed)
        );
    }

    #[test]
    fn test_failed_can_return_to_pending() {
        let mut db = db_with_pending(MetricType::Stress);
        db.update_sync_status(1, day(), MetricType::Stress, SyncStatus::Failed)
            .unwrap();
        db.update_sync_status(1, day(), MetricType::Stress, SyncStatus::Pending)
            .unwrap();
        assert_eq!(
            db.get_pending_metrics(1, day()).unwrap(),
            vec![MetricType::Stress]
        );
    }

    #[test]
    fn test_update_touches_updated_at() {
        let mut db = db_with_pending(MetricType::Hrv);
        db.update_sync_status(1, day(), MetricType::Hrv, SyncStatus::Success)
            .unwrap();
        let records = db.list_sync_status(1, day(), day()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SyncStatus::Success);
        assert!(records[0].updated_at.is_some());
    }

    #[test]
    fn test_reset_failed() {
        let mut db = HealthDb::open_in_memory().unwrap();
        db.create_sync_status(1, day(), MetricType::Steps, SyncStatus::Failed)
            .unwrap();
        db.create_sync_status(1, day(), MetricType::Sleep, SyncStatus::Failed)
            .unwrap();
        db.create_sync_status(2, day(), MetricType::Sleep, SyncStatus::Failed)
            .unwrap();

        assert_eq!(db.reset_failed_sync_status(1).unwrap(), 2);
        assert_eq!(db.get_pending_metrics(1, day()).unwrap().len(), 2);
        assert_eq!(
            db.get_sync_status(2, day(), MetricType::Sleep).unwrap(),
            Some(SyncStatus::Failed)
        );
    }

    #[test]
    fn test_status_counts() {
        let mut db = HealthDb::open_in_memory().unwrap();
        let next = day().succ_opt().unwrap();
        db.create_sync_status(1, day(), MetricType::Steps, SyncStatus::Pending)
            .unwrap();
        db.create_sync_status(1, day(), MetricType::Sleep, SyncStatus::Completed)
            .unwrap();
        db.create_sync_status(1, next, MetricType::Steps, SyncStatus::Failed)
            .unwrap();

        let counts = db.sync_status_counts(1, day(), next).unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);

        let first_day = db.sync_status_counts(1, day(), day()).unwrap();
        assert_eq!(first_day.total(), 2);
    }
}
