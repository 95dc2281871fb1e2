use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 bearer token used as the authentication handle for API requests.
///
/// Tokens are obtained out of band (for example by a Garmin login tool) and
/// dropped into the credential store; this crate only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuth2Token {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub jti: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds; zero when unknown
    #[serde(default)]
    pub expires_at: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuth2Token {
    /// Bearer token expiring at `expires_at` (unix seconds)
    pub fn bearer(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            scope: String::new(),
            jti: String::new(),
            token_type: default_token_type(),
            access_token: access_token.into(),
            refresh_token: String::new(),
            expires_in: 0,
            expires_at,
        }
    }

    /// Check if the access token has expired.
    ///
    /// A token without a recorded expiry is treated as valid and left for the
    /// server to reject.
    pub fn is_expired(&self) -> bool {
        self.expires_at > 0 && self.expires_at < Utc::now().timestamp()
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        (self.expires_at > 0)
            .then(|| DateTime::from_timestamp(self.expires_at, 0))
            .flatten()
    }

    /// Returns the Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}
