//! Mapping of raw Garmin Connect responses onto storage-ready data

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};

use super::source::{DataExtractor, MetricData};
use crate::db::models::{Attributes, HealthMetricFields, MetricType, TimeSeriesSample};
use crate::error::{LocalDbError, Result};

/// Activity keys copied into the attribute side-channel, as (raw, stored)
const ACTIVITY_ATTRIBUTES: &[(&str, &str)] = &[
    ("averageSpeed", "avg_speed"),
    ("maxSpeed", "max_speed"),
    ("elevationGain", "elevation_gain"),
    ("elevationLoss", "elevation_loss"),
    ("averageRunningCadenceInStepsPerMinute", "avg_cadence"),
    ("avgPower", "avg_power"),
    ("normPower", "normalized_power"),
    ("aerobicTrainingEffect", "training_effect"),
    ("startLatitude", "start_lat"),
    ("startLongitude", "start_lon"),
    ("locationName", "location_name"),
    ("startTimeLocal", "start_time_local"),
];

/// Daily summary keys without a dedicated column, kept in `extra`
const SUMMARY_EXTRA: &[(&str, &str)] = &[
    ("floorsAscended", "floors_ascended"),
    ("moderateIntensityMinutes", "moderate_intensity_minutes"),
    ("vigorousIntensityMinutes", "vigorous_intensity_minutes"),
    ("averageSpo2Value", "avg_spo2"),
    ("lowestSpo2Value", "lowest_spo2"),
];

/// Extractor for Garmin Connect JSON payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct GarminExtractor;

impl DataExtractor for GarminExtractor {
    fn extract_metric_data(&self, raw: &Value, metric: MetricType) -> Result<MetricData> {
        if is_blank(raw) {
            return Ok(MetricData::Empty);
        }

        let data = match metric {
            MetricType::Activities => MetricData::Activity(extract_activity(raw)?),
            MetricType::DailySummary => MetricData::Daily(extract_daily_summary(raw)),
            MetricType::Calories => MetricData::Daily(extract_calories(raw)),
            MetricType::Steps => MetricData::Daily(extract_steps(raw)),
            MetricType::Sleep => MetricData::Daily(extract_sleep(raw)),
            MetricType::Hrv => MetricData::Daily(extract_hrv(raw)),
            MetricType::TrainingReadiness => MetricData::Daily(extract_training_readiness(raw)),
            MetricType::HeartRate => extract_heart_rate(raw),
            MetricType::Stress => extract_stress(raw),
            MetricType::BodyBattery => extract_body_battery(raw),
            MetricType::Respiration => extract_respiration(raw),
        };

        Ok(if data.is_empty() { MetricData::Empty } else { data })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    value.as_f64().map(|float| float.round() as i64)
}

fn first_entry(value: &Value) -> Option<&Value> {
    if let Some(array) = value.as_array() {
        array.first()
    } else {
        Some(value)
    }
}

fn get_i64(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(value_to_i64)
}

fn get_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(|v| v.as_f64())
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn seconds_to_hours(value: &Value, key: &str) -> Option<f64> {
    get_f64(value, key).map(|secs| (secs / 3600.0 * 100.0).round() / 100.0)
}

/// Garmin timestamps look like `2024-01-15 08:30:00` or `2024-01-15T08:30:00.0`
fn parse_garmin_datetime(s: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse `[[epoch_ms, value, ...], ...]` sample arrays.
///
/// Entries whose value is null or negative (Garmin's "not measured" markers)
/// are dropped.
fn sample_array(value: &Value, key: &str, value_index: usize) -> Vec<TimeSeriesSample> {
    let Some(entries) = value.get(key).and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_array()?;
            let timestamp = DateTime::from_timestamp_millis(entry.first()?.as_i64()?)?;
            let reading = entry.get(value_index)?.as_f64()?;
            (reading >= 0.0).then(|| TimeSeriesSample::new(timestamp, reading))
        })
        .collect()
}

fn extract_activity(raw: &Value) -> Result<Attributes> {
    let activity_id = raw
        .get("activityId")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| LocalDbError::invalid_response("Missing activityId"))?;

    let start_local = raw.get("startTimeLocal").and_then(|v| v.as_str());
    let start_gmt = raw
        .get("startTimeGMT")
        .and_then(|v| v.as_str())
        .and_then(parse_garmin_datetime);

    let mut fields = Attributes::new();
    fields.insert("activity_id".into(), activity_id);
    if let Some(local) = start_local {
        fields.insert("activity_date".into(), json!(local));
    }

    let typed = [
        ("activity_name", raw.get("activityName").cloned()),
        (
            "activity_type",
            raw.get("activityType").and_then(|t| t.get("typeKey")).cloned(),
        ),
        ("start_time", start_gmt.map(|t| json!(t.to_rfc3339()))),
        ("duration_seconds", raw.get("duration").cloned()),
        ("distance_meters", raw.get("distance").cloned()),
        ("calories", get_i64(raw, "calories").map(Value::from)),
        ("avg_heart_rate", get_i64(raw, "averageHR").map(Value::from)),
        ("max_heart_rate", get_i64(raw, "maxHR").map(Value::from)),
        ("training_load", raw.get("activityTrainingLoad").cloned()),
    ];
    for (key, value) in typed {
        if let Some(value) = value.filter(|v| !v.is_null()) {
            fields.insert(key.to_string(), value);
        }
    }

    for (raw_key, key) in ACTIVITY_ATTRIBUTES {
        if let Some(value) = raw.get(*raw_key).filter(|v| !v.is_null()) {
            fields.insert(key.to_string(), value.clone());
        }
    }

    Ok(fields)
}

fn extract_daily_summary(raw: &Value) -> HealthMetricFields {
    let mut fields = HealthMetricFields {
        total_steps: get_i64(raw, "totalSteps"),
        step_goal: get_i64(raw, "dailyStepGoal"),
        total_distance_meters: get_f64(raw, "totalDistanceMeters"),
        resting_heart_rate: get_i64(raw, "restingHeartRate"),
        max_heart_rate: get_i64(raw, "maxHeartRate"),
        min_heart_rate: get_i64(raw, "minHeartRate"),
        avg_stress_level: get_i64(raw, "averageStressLevel"),
        max_stress_level: get_i64(raw, "maxStressLevel"),
        body_battery_high: get_i64(raw, "bodyBatteryHighestValue"),
        body_battery_low: get_i64(raw, "bodyBatteryLowestValue"),
        average_respiration: get_f64(raw, "averageRespirationValue")
            .or_else(|| get_f64(raw, "avgWakingRespirationValue")),
        ..extract_calories(raw)
    };

    for (raw_key, key) in SUMMARY_EXTRA {
        if let Some(value) = raw.get(*raw_key).filter(|v| !v.is_null()) {
            fields.extra.insert(key.to_string(), value.clone());
        }
    }
    fields
}

fn extract_calories(raw: &Value) -> HealthMetricFields {
    HealthMetricFields {
        total_calories: get_i64(raw, "totalKilocalories"),
        active_calories: get_i64(raw, "activeKilocalories"),
        bmr_calories: get_i64(raw, "bmrKilocalories"),
        ..Default::default()
    }
}

fn extract_steps(raw: &Value) -> HealthMetricFields {
    let Some(entry) = first_entry(raw) else {
        return HealthMetricFields::default();
    };
    HealthMetricFields {
        total_steps: get_i64(entry, "totalSteps"),
        step_goal: get_i64(entry, "stepGoal"),
        total_distance_meters: get_f64(entry, "totalDistance"),
        ..Default::default()
    }
}

fn extract_sleep(raw: &Value) -> HealthMetricFields {
    let dto = raw.get("dailySleepDTO").unwrap_or(raw);

    let deep = seconds_to_hours(dto, "deepSleepSeconds");
    let light = seconds_to_hours(dto, "lightSleepSeconds");
    let rem = seconds_to_hours(dto, "remSleepSeconds");
    let total = seconds_to_hours(dto, "sleepTimeSeconds").or_else(|| match (deep, light, rem) {
        (Some(d), Some(l), Some(r)) => Some(d + l + r),
        _ => None,
    });

    HealthMetricFields {
        sleep_duration_hours: total,
        deep_sleep_hours: deep,
        light_sleep_hours: light,
        rem_sleep_hours: rem,
        awake_sleep_hours: seconds_to_hours(dto, "awakeSleepSeconds"),
        sleep_score: dto
            .get("sleepScores")
            .and_then(|v| v.get("overall"))
            .and_then(|v| v.get("value"))
            .and_then(value_to_i64),
        ..Default::default()
    }
}

fn extract_hrv(raw: &Value) -> HealthMetricFields {
    let summary = raw.get("hrvSummary").unwrap_or(raw);
    HealthMetricFields {
        hrv_weekly_avg: get_f64(summary, "weeklyAvg"),
        hrv_last_night_avg: get_f64(summary, "lastNightAvg").or_else(|| get_f64(summary, "lastNight")),
        hrv_status: get_string(summary, "status"),
        ..Default::default()
    }
}

fn extract_training_readiness(raw: &Value) -> HealthMetricFields {
    let Some(entry) = first_entry(raw) else {
        return HealthMetricFields::default();
    };
    HealthMetricFields {
        training_readiness_score: get_i64(entry, "score"),
        training_readiness_level: get_string(entry, "level"),
        ..Default::default()
    }
}

fn extract_heart_rate(raw: &Value) -> MetricData {
    MetricData::TimeSeries {
        samples: sample_array(raw, "heartRateValues", 1),
        daily: HealthMetricFields {
            resting_heart_rate: get_i64(raw, "restingHeartRate"),
            max_heart_rate: get_i64(raw, "maxHeartRate"),
            min_heart_rate: get_i64(raw, "minHeartRate"),
            ..Default::default()
        },
    }
}

fn extract_stress(raw: &Value) -> MetricData {
    MetricData::TimeSeries {
        samples: sample_array(raw, "stressValuesArray", 1),
        daily: HealthMetricFields {
            avg_stress_level: get_i64(raw, "avgStressLevel"),
            max_stress_level: get_i64(raw, "maxStressLevel"),
            ..Default::default()
        },
    }
}

fn extract_body_battery(raw: &Value) -> MetricData {
    let Some(report) = first_entry(raw) else {
        return MetricData::Empty;
    };

    // Entries are [timestamp, level] or [timestamp, status, level, version]
    let samples = report
        .get("bodyBatteryValuesArray")
        .and_then(|v| v.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.as_array())
        .map(|entry| if entry.len() >= 3 { 2 } else { 1 })
        .map(|idx| sample_array(report, "bodyBatteryValuesArray", idx))
        .unwrap_or_default();

    let high = samples.iter().map(|s| s.value).reduce(f64::max);
    let low = samples.iter().map(|s| s.value).reduce(f64::min);

    let mut daily = HealthMetricFields {
        body_battery_high: high.map(|v| v.round() as i64),
        body_battery_low: low.map(|v| v.round() as i64),
        ..Default::default()
    };
    for (raw_key, key) in [("charged", "body_battery_charged"), ("drained", "body_battery_drained")] {
        if let Some(value) = get_i64(report, raw_key) {
            daily.extra.insert(key.to_string(), Value::from(value));
        }
    }

    MetricData::TimeSeries { samples, daily }
}

fn extract_respiration(raw: &Value) -> MetricData {
    MetricData::TimeSeries {
        samples: sample_array(raw, "respirationValuesArray", 1),
        daily: HealthMetricFields {
            average_respiration: get_f64(raw, "avgWakingRespirationValue"),
            ..Default::default()
        },
    }
}
