use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::db::models::{MetricType, SyncStatus};

/// Main error type for garmin-localdb
#[derive(Error, Debug)]
pub enum LocalDbError {
    #[error("Failed to initialize store at {}: {reason}", path.display())]
    StoreInit { path: PathBuf, reason: String },

    #[error("Store schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Write failed: {0}")]
    StoreWrite(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("No sync status for user {user_id} on {date} ({metric})")]
    UnknownKey {
        user_id: i64,
        date: NaiveDate,
        metric: MetricType,
    },

    #[error("Invalid sync status transition: {from} -> {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    #[error("Authentication required. Place an OAuth2 token in the credential store first.")]
    NotAuthenticated,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),
}

pub type Result<T> = std::result::Result<T, LocalDbError>;

impl LocalDbError {
    /// Create a validation error from a message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a write error from a message
    pub fn write(msg: impl Into<String>) -> Self {
        Self::StoreWrite(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether this error came from talking to the remote service
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::RateLimited
                | Self::Api { .. }
                | Self::Http(_)
                | Self::InvalidResponse(_)
        )
    }
}

/// Map a rusqlite error raised by a write into `StoreWrite`
pub(crate) fn write_err(context: &str) -> impl FnOnce(rusqlite::Error) -> LocalDbError + '_ {
    move |e| LocalDbError::StoreWrite(format!("{}: {}", context, e))
}

/// Map a rusqlite error raised by a read into `Query`
pub(crate) fn query_err(context: &str) -> impl FnOnce(rusqlite::Error) -> LocalDbError + '_ {
    move |e| LocalDbError::Query(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LocalDbError::Validation("activity_id is required".to_string());
        assert_eq!(err.to_string(), "Validation error: activity_id is required");
    }

    #[test]
    fn test_unknown_key_display() {
        let err = LocalDbError::UnknownKey {
            user_id: 1,
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            metric: MetricType::HeartRate,
        };
        let msg = err.to_string();
        assert!(msg.contains("2023-01-01"));
        assert!(msg.contains("heart_rate"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = LocalDbError::InvalidTransition {
            from: SyncStatus::Completed,
            to: SyncStatus::Failed,
        };
        assert_eq!(err.to_string(), "Invalid sync status transition: completed -> failed");
    }

    #[test]
    fn test_invalid_date_format_error() {
        let err = LocalDbError::InvalidDateFormat("not-a-date".to_string());
        assert!(err.to_string().contains("not-a-date"));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(LocalDbError::validation("x"), LocalDbError::Validation(_)));
        assert!(matches!(LocalDbError::write("x"), LocalDbError::StoreWrite(_)));
        assert!(matches!(LocalDbError::config("x"), LocalDbError::Config(_)));
        assert!(matches!(
            LocalDbError::invalid_response("x"),
            LocalDbError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_fetch_error_classification() {
        assert!(LocalDbError::RateLimited.is_fetch_error());
        assert!(LocalDbError::NotAuthenticated.is_fetch_error());
        assert!(LocalDbError::Api { status: 500, message: "boom".into() }.is_fetch_error());
        assert!(!LocalDbError::validation("x").is_fetch_error());
        assert!(!LocalDbError::write("x").is_fetch_error());
    }
}
