mod credentials;

pub use credentials::CredentialStore;

use crate::db::models::MetricType;
use crate::error::{LocalDbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration directory name
const CONFIG_DIR_NAME: &str = "garmin";

const CONFIG_FILENAME: &str = "localdb.json";

/// Get the configuration directory path
/// Returns ~/.config/garmin on Unix, ~/Library/Application Support/garmin on macOS
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| LocalDbError::config("Could not determine config directory"))
}

/// Get the data directory path for storing tokens
/// Returns ~/.local/share/garmin on Unix, ~/Library/Application Support/garmin on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| LocalDbError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Behaviour of a sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Move `failed` pairs back to `pending` and fetch them again
    pub retry_failed: bool,
    /// Minimum delay between API requests
    pub request_delay_ms: u64,
    pub max_backoff_secs: u64,
    /// Page size for the activity search endpoint
    pub activities_page_size: u32,
    /// Metrics synced when none are given on the command line
    pub metrics: Vec<MetricType>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_failed: true,
            request_delay_ms: 2000,
            max_backoff_secs: 300,
            activities_page_size: 50,
            metrics: vec![
                MetricType::Activities,
                MetricType::DailySummary,
                MetricType::Sleep,
                MetricType::HeartRate,
                MetricType::Stress,
                MetricType::BodyBattery,
                MetricType::Hrv,
            ],
        }
    }
}

impl SyncConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// Settings loaded from `<config_dir>/garmin/localdb.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalDbConfig {
    /// Store location; the platform data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    pub profile: String,
    pub domain: String,
    /// Local user key for rows written by this installation
    pub user_id: i64,
    pub sync: SyncConfig,
}

impl Default for LocalDbConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            profile: "default".to_string(),
            domain: "garmin.com".to_string(),
            user_id: 1,
            sync: SyncConfig::default(),
        }
    }
}

impl LocalDbConfig {
    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join(CONFIG_FILENAME))
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            LocalDbError::config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(crate::storage::default_db_path)
    }
}
