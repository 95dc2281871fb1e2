//! Store contract tests against an on-disk database

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use garmin_localdb::{
    ActivityRecord, HealthDb, HealthMetricFields, LocalDbError, MetricType, SyncStatus,
    TimeSeriesSample,
};
use serde_json::json;
use tempfile::TempDir;

fn open_db() -> (TempDir, HealthDb) {
    let temp = TempDir::new().unwrap();
    let db = HealthDb::open(temp.path().join("test_health.db")).unwrap();
    (temp, db)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, h, m, 0).unwrap()
}

fn steps(total: i64) -> HealthMetricFields {
    HealthMetricFields {
        total_steps: Some(total),
        ..Default::default()
    }
}

mod store_tests {
    use super::*;

    #[test]
    fn test_initialization_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test_health.db");
        let _db = HealthDb::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test_health.db");
        {
            let mut db = HealthDb::open(&path).unwrap();
            db.store_health_metric(1, date(2023, 1, 1), &steps(1000))
                .unwrap();
        }
        let db = HealthDb::open(&path).unwrap();
        assert!(db.validate_schema().unwrap());
        assert!(db.health_metric_exists(1, date(2023, 1, 1)).unwrap());
    }

    #[test]
    fn test_get_schema_info() {
        let (temp, db) = open_db();
        let info = db.get_schema_info();

        let mut tables = info.tables.clone();
        tables.sort();
        assert_eq!(
            tables,
            vec!["activities", "daily_health_metrics", "sync_status", "timeseries"]
        );
        assert_eq!(info.db_path, temp.path().join("test_health.db"));
    }

    #[test]
    fn test_validate_schema() {
        let (_temp, db) = open_db();
        assert!(db.validate_schema().unwrap());
    }

    #[test]
    fn test_scoped_session_commits() {
        let (_temp, mut db) = open_db();
        let session = db.scoped_session().unwrap();
        session
            .store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)))
            .unwrap();
        session.commit().unwrap();
        assert!(db.activity_exists(1, "1").unwrap());
    }
}

mod timeseries_tests {
    use super::*;

    #[test]
    fn test_store_and_query_heart_rate() {
        let (_temp, mut db) = open_db();
        let samples = vec![
            TimeSeriesSample::new(at(12, 0), 80.0),
            TimeSeriesSample::new(at(12, 1), 82.0),
        ];

        let inserted = db
            .store_timeseries_batch(1, MetricType::HeartRate, &samples)
            .unwrap();
        assert_eq!(inserted, 2);

        let rows = db
            .get_timeseries(1, MetricType::HeartRate, at(12, 0), at(12, 1))
            .unwrap();
        let values: Vec<f64> = rows.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![80.0, 82.0]);
        assert_eq!(rows[0].timestamp, at(12, 0));
    }

    #[test]
    fn test_duplicate_samples_are_skipped() {
        let (_temp, mut db) = open_db();
        let sample = TimeSeriesSample::new(at(12, 0), 80.0);

        db.store_timeseries_batch(1, MetricType::HeartRate, &[sample.clone()])
            .unwrap();
        let inserted = db
            .store_timeseries_batch(
                1,
                MetricType::HeartRate,
                &[sample, TimeSeriesSample::new(at(12, 5), 90.0)],
            )
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(
            db.count_timeseries(1, MetricType::HeartRate, at(0, 0), at(23, 59))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (_temp, mut db) = open_db();
        assert_eq!(
            db.store_timeseries_batch(1, MetricType::Stress, &[]).unwrap(),
            0
        );
    }

    #[test]
    fn test_range_is_inclusive_and_partitioned() {
        let (_temp, mut db) = open_db();
        let samples: Vec<_> = (0..5)
            .map(|m| TimeSeriesSample::new(at(12, m), 70.0 + m as f64))
            .collect();
        db.store_timeseries_batch(1, MetricType::HeartRate, &samples)
            .unwrap();
        db.store_timeseries_batch(1, MetricType::Stress, &samples)
            .unwrap();
        db.store_timeseries_batch(2, MetricType::HeartRate, &samples)
            .unwrap();

        let rows = db
            .get_timeseries(1, MetricType::HeartRate, at(12, 1), at(12, 3))
            .unwrap();
        let values: Vec<f64> = rows.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![71.0, 72.0, 73.0]);
    }

    #[test]
    fn test_sub_millisecond_samples_are_distinct() {
        let (_temp, mut db) = open_db();
        let t0 = at(12, 0);
        let t1 = t0 + chrono::Duration::microseconds(500);
        let samples = vec![TimeSeriesSample::new(t0, 80.0), TimeSeriesSample::new(t1, 82.0)];

        let inserted = db
            .store_timeseries_batch(1, MetricType::HeartRate, &samples)
            .unwrap();
        assert_eq!(inserted, 2);

        let rows = db.get_timeseries(1, MetricType::HeartRate, t0, t1).unwrap();
        let timestamps: Vec<_> = rows.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![t0, t1]);
        assert_eq!(rows[1].value, 82.0);
    }

    #[test]
    fn test_sample_attributes_round_trip() {
        let (_temp, mut db) = open_db();
        let mut attributes = serde_json::Map::new();
        attributes.insert("source".into(), json!("wrist"));
        let sample = TimeSeriesSample::new(at(8, 0), 55.0).with_attributes(attributes);

        db.store_timeseries_batch(1, MetricType::HeartRate, &[sample.clone()])
            .unwrap();
        let rows = db
            .get_timeseries(1, MetricType::HeartRate, at(8, 0), at(8, 0))
            .unwrap();
        assert_eq!(rows, vec![sample]);
    }
}

mod activity_tests {
    use super::*;

    #[test]
    fn test_store_activity() {
        let (_temp, mut db) = open_db();
        let record = ActivityRecord::new("12345", date(2023, 1, 1)).with_name("Running");
        db.store_activity(1, &record).unwrap();

        let stored = db.get_activity(1, "12345").unwrap().unwrap();
        assert_eq!(stored.user_id, 1);
        assert_eq!(stored.record.activity_id, "12345");
        assert_eq!(stored.record.activity_name.as_deref(), Some("Running"));
    }

    #[test]
    fn test_repeat_store_keeps_one_row_with_latest_values() {
        let (_temp, mut db) = open_db();
        db.store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)).with_name("Run"))
            .unwrap();
        db.store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)).with_name("Long Run"))
            .unwrap();

        let activities = db
            .get_activities(1, date(2023, 1, 1), date(2023, 1, 1))
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].record.activity_name.as_deref(), Some("Long Run"));
    }

    #[test]
    fn test_from_fields_requires_keys() {
        let mut fields = serde_json::Map::new();
        fields.insert("activity_name".into(), json!("Running"));
        assert!(matches!(
            ActivityRecord::from_fields(fields.clone()),
            Err(LocalDbError::Validation(_))
        ));

        fields.insert("activity_id".into(), json!("1"));
        assert!(matches!(
            ActivityRecord::from_fields(fields.clone()),
            Err(LocalDbError::Validation(_))
        ));

        fields.insert("activity_date".into(), json!("2023-01-01"));
        let record = ActivityRecord::from_fields(fields).unwrap();
        assert_eq!(record.activity_date, date(2023, 1, 1));
    }

    #[test]
    fn test_empty_activity_id_is_rejected() {
        let (_temp, mut db) = open_db();
        let result = db.store_activity(1, &ActivityRecord::new("  ", date(2023, 1, 1)));
        assert!(matches!(result, Err(LocalDbError::Validation(_))));
        assert!(db
            .get_activities(1, date(2023, 1, 1), date(2023, 1, 1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_get_activities_ordered_by_date() {
        let (_temp, mut db) = open_db();
        db.store_activity(1, &ActivityRecord::new("2", date(2023, 1, 2)).with_name("Cycling"))
            .unwrap();
        db.store_activity(1, &ActivityRecord::new("1", date(2023, 1, 1)).with_name("Running"))
            .unwrap();
        db.store_activity(1, &ActivityRecord::new("3", date(2023, 1, 3)).with_name("Swimming"))
            .unwrap();

        let activities = db
            .get_activities(1, date(2023, 1, 1), date(2023, 1, 2))
            .unwrap();
        let names: Vec<_> = activities
            .iter()
            .map(|a| a.record.activity_name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["Running", "Cycling"]);
    }
}

mod health_metric_tests {
    use super::*;

    #[test]
    fn test_store_health_metric() {
        let (_temp, mut db) = open_db();
        db.store_health_metric(1, date(2023, 1, 1), &steps(1000))
            .unwrap();

        let metric = db.get_health_metric(1, date(2023, 1, 1)).unwrap().unwrap();
        assert_eq!(metric.user_id, 1);
        assert_eq!(metric.metric_date, date(2023, 1, 1));
        assert_eq!(metric.fields.total_steps, Some(1000));
    }

    #[test]
    fn test_unspecified_fields_are_kept() {
        let (_temp, mut db) = open_db();
        db.store_health_metric(1, date(2023, 1, 1), &steps(1000))
            .unwrap();
        db.store_health_metric(
            1,
            date(2023, 1, 1),
            &HealthMetricFields {
                sleep_duration_hours: Some(7.5),
                ..Default::default()
            },
        )
        .unwrap();
        db.store_health_metric(1, date(2023, 1, 1), &steps(1500))
            .unwrap();

        let metrics = db
            .get_health_metrics(1, date(2023, 1, 1), date(2023, 1, 1))
            .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].fields.total_steps, Some(1500));
        assert_eq!(metrics[0].fields.sleep_duration_hours, Some(7.5));
    }

    #[test]
    fn test_extra_keys_replace_whole_values() {
        let (_temp, mut db) = open_db();
        let day = date(2023, 1, 1);

        let mut first = HealthMetricFields::default();
        first.extra.insert("zones".into(), json!({"z1": 10, "z2": 20}));
        first.extra.insert("floors_climbed".into(), json!(4));
        db.store_health_metric(1, day, &first).unwrap();

        let mut second = HealthMetricFields::default();
        second.extra.insert("zones".into(), json!({"z1": 12, "z3": null}));
        second.extra.insert("floors_climbed".into(), json!(null));
        db.store_health_metric(1, day, &second).unwrap();

        let metric = db.get_health_metric(1, day).unwrap().unwrap();
        assert_eq!(metric.fields.extra.get("zones"), Some(&json!({"z1": 12, "z3": null})));
        assert_eq!(metric.fields.extra.get("floors_climbed"), Some(&json!(4)));
    }

    #[test]
    fn test_get_health_metrics_range() {
        let (_temp, mut db) = open_db();
        db.store_health_metric(1, date(2023, 1, 2), &steps(2000))
            .unwrap();
        db.store_health_metric(1, date(2023, 1, 1), &steps(1000))
            .unwrap();
        db.store_health_metric(1, date(2023, 1, 3), &steps(3000))
            .unwrap();

        let metrics = db
            .get_health_metrics(1, date(2023, 1, 1), date(2023, 1, 2))
            .unwrap();
        let totals: Vec<_> = metrics.iter().map(|m| m.fields.total_steps).collect();
        assert_eq!(totals, vec![Some(1000), Some(2000)]);
    }
}

mod sync_status_tests {
    use super::*;

    #[test]
    fn test_create_and_get_sync_status() {
        let (_temp, mut db) = open_db();
        db.create_sync_status(1, date(2023, 1, 1), MetricType::HeartRate, SyncStatus::Pending)
            .unwrap();
        assert_eq!(
            db.get_sync_status(1, date(2023, 1, 1), MetricType::HeartRate)
                .unwrap(),
            Some(SyncStatus::Pending)
        );
    }

    #[test]
    fn test_missing_status_is_none() {
        let (_temp, db) = open_db();
        assert_eq!(
            db.get_sync_status(1, date(2023, 1, 1), MetricType::HeartRate)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_update_sync_status() {
        let (_temp, mut db) = open_db();
        db.create_sync_status(1, date(2023, 1, 1), MetricType::HeartRate, SyncStatus::Pending)
            .unwrap();
        db.update_sync_status(1, date(2023, 1, 1), MetricType::HeartRate, SyncStatus::Success)
            .unwrap();
        assert_eq!(
            db.get_sync_status(1, date(2023, 1, 1), MetricType::HeartRate)
                .unwrap(),
            Some(SyncStatus::Success)
        );
    }

    #[test]
    fn test_get_pending_metrics() {
        let (_temp, mut db) = open_db();
        db.create_sync_status(1, date(2023, 1, 1), MetricType::HeartRate, SyncStatus::Pending)
            .unwrap();
        db.create_sync_status(1, date(2023, 1, 1), MetricType::Steps, SyncStatus::Success)
            .unwrap();

        assert_eq!(
            db.get_pending_metrics(1, date(2023, 1, 1)).unwrap(),
            vec![MetricType::HeartRate]
        );
    }
}

#[test]
fn test_existence_checks() {
    let (_temp, mut db) = open_db();
    let day = date(2023, 1, 1);

    assert!(!db.activity_exists(1, "12345").unwrap());
    assert!(!db.health_metric_exists(1, day).unwrap());
    assert!(!db.sync_status_exists(1, day, MetricType::HeartRate).unwrap());

    db.store_activity(1, &ActivityRecord::new("12345", day))
        .unwrap();
    db.store_health_metric(1, day, &HealthMetricFields::default())
        .unwrap();
    db.create_sync_status(1, day, MetricType::HeartRate, SyncStatus::Pending)
        .unwrap();

    assert!(db.activity_exists(1, "12345").unwrap());
    assert!(db.health_metric_exists(1, day).unwrap());
    assert!(db.sync_status_exists(1, day, MetricType::HeartRate).unwrap());

    // Other users see nothing
    assert!(!db.activity_exists(2, "12345").unwrap());
}
