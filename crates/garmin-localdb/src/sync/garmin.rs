//! Garmin Connect implementations of the sync collaborators

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::rate_limiter::RateLimiter;
use super::source::{ActivitiesIterator, MetricSource};
use crate::client::{GarminClient, OAuth2Token};
use crate::db::models::MetricType;
use crate::error::{LocalDbError, Result};

/// Rate-limited, authenticated access shared by both collaborators
#[derive(Clone)]
pub struct GarminApi {
    client: GarminClient,
    token: OAuth2Token,
    limiter: Arc<RateLimiter>,
}

impl GarminApi {
    pub fn new(client: GarminClient, token: OAuth2Token, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            token,
            limiter,
        }
    }

    pub fn token(&self) -> &OAuth2Token {
        &self.token
    }

    /// GET `path` as JSON. A 404 is a day without data and yields `{}`.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        if self.limiter.should_pause() {
            return Err(LocalDbError::RateLimited);
        }
        self.limiter.wait().await;

        match self.client.get_json::<Value>(&self.token, path).await {
            Ok(value) => {
                self.limiter.on_success();
                Ok(value)
            }
            Err(LocalDbError::Api { status: 404, .. }) => {
                self.limiter.on_success();
                tracing::debug!(path, "No data (404)");
                Ok(json!({}))
            }
            Err(LocalDbError::RateLimited) => {
                self.limiter.on_rate_limit();
                Err(LocalDbError::RateLimited)
            }
            Err(e) => Err(e),
        }
    }
}

/// Per-metric fetches against the Connect wellness endpoints
pub struct GarminMetricSource {
    api: GarminApi,
    display_name: OnceCell<String>,
}

impl GarminMetricSource {
    pub fn new(api: GarminApi) -> Self {
        Self {
            api,
            display_name: OnceCell::new(),
        }
    }

    async fn display_name(&self) -> Result<&str> {
        let name = self
            .display_name
            .get_or_try_init(|| async {
                let profile = self.api.get_json("/userprofile-service/socialProfile").await?;
                profile
                    .get("displayName")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| LocalDbError::invalid_response("Could not get display name"))
            })
            .await?;
        Ok(name.as_str())
    }
}

fn needs_display_name(metric: MetricType) -> bool {
    matches!(
        metric,
        MetricType::DailySummary | MetricType::Calories | MetricType::Sleep | MetricType::HeartRate
    )
}

/// API path for a metric on a day
pub fn endpoint(metric: MetricType, date: NaiveDate, display_name: &str) -> Option<String> {
    let path = match metric {
        MetricType::DailySummary | MetricType::Calories => format!(
            "/usersummary-service/usersummary/daily/{}?calendarDate={}",
            display_name, date
        ),
        MetricType::Sleep => format!(
            "/wellness-service/wellness/dailySleepData/{}?date={}&nonSleepBufferMinutes=60",
            display_name, date
        ),
        MetricType::HeartRate => format!(
            "/wellness-service/wellness/dailyHeartRate/{}?date={}",
            display_name, date
        ),
        MetricType::Stress => format!("/wellness-service/wellness/dailyStress/{}", date),
        MetricType::BodyBattery => format!(
            "/wellness-service/wellness/bodyBattery/reports/daily?startDate={}&endDate={}",
            date, date
        ),
        MetricType::Hrv => format!("/hrv-service/hrv/{}", date),
        MetricType::TrainingReadiness => {
            format!("/metrics-service/metrics/trainingreadiness/{}", date)
        }
        MetricType::Respiration => format!("/wellness-service/wellness/daily/respiration/{}", date),
        MetricType::Steps => format!("/usersummary-service/stats/steps/daily/{}/{}", date, date),
        MetricType::Activities => return None,
    };
    Some(path)
}

#[async_trait]
impl MetricSource for GarminMetricSource {
    async fn fetch_metric(&self, metric: MetricType, date: NaiveDate) -> Result<Value> {
        let display_name = if needs_display_name(metric) {
            self.display_name().await?
        } else {
            ""
        };

        let path = endpoint(metric, date, display_name).ok_or_else(|| {
            LocalDbError::validation("Activities are fetched through the activities iterator")
        })?;
        self.api.get_json(&path).await
    }
}

/// Paginated activity search for a single day
pub struct GarminActivitiesIterator {
    api: GarminApi,
    page_size: u32,
    initialized: bool,
}

impl GarminActivitiesIterator {
    pub fn new(api: GarminApi, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            initialized: false,
        }
    }
}

#[async_trait]
impl ActivitiesIterator for GarminActivitiesIterator {
    async fn initialize(&mut self) -> Result<()> {
        if self.api.token().is_expired() {
            return Err(LocalDbError::NotAuthenticated);
        }
        self.initialized = true;
        Ok(())
    }

    async fn get_activities_for_date(&self, date: NaiveDate) -> Result<Vec<Value>> {
        if !self.initialized {
            return Err(LocalDbError::config("Activities iterator used before initialize"));
        }

        let mut activities = Vec::new();
        let mut start = 0u32;
        loop {
            let path = format!(
                "/activitylist-service/activities/search/activities?startDate={}&endDate={}&limit={}&start={}",
                date, date, self.page_size, start
            );
            let page = self.api.get_json(&path).await?;
            let items = match page {
                Value::Array(items) => items,
                // 404 comes back as an empty object
                Value::Object(map) if map.is_empty() => Vec::new(),
                other => {
                    return Err(LocalDbError::invalid_response(format!(
                        "Expected activity list, got {}",
                        other
                    )));
                }
            };

            let count = items.len() as u32;
            activities.extend(items);
            if count < self.page_size {
                break;
            }
            start += self.page_size;
        }

        tracing::debug!(%date, count = activities.len(), "Fetched activities");
        Ok(activities)
    }
}
