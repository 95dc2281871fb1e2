//! Garmin Connect API client for authenticated requests
//!
//! Thin wrapper over `reqwest` that attaches the OAuth2 bearer header and maps
//! HTTP status codes onto [`LocalDbError`] variants.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::client::tokens::OAuth2Token;
use crate::error::{LocalDbError, Result};

/// User agent for Connect API requests
const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Garmin Connect API client
#[derive(Debug, Clone)]
pub struct GarminClient {
    client: Client,
    base_url: String,
}

impl GarminClient {
    /// Create a new API client for the given domain
    pub fn new(domain: &str) -> Result<Self> {
        Self::new_with_base_url(&format!("https://connectapi.{}", domain))
    }

    /// Create a new API client with a custom base URL (for testing)
    #[doc(hidden)]
    pub fn new_with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the full URL for a given path
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build headers with authorization
    fn build_headers(&self, token: &OAuth2Token) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(API_USER_AGENT));
        let auth = HeaderValue::from_str(&token.authorization_header())
            .map_err(|_| LocalDbError::config("OAuth2 token contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Make an authenticated GET request and return the response
    pub async fn get(&self, token: &OAuth2Token, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        let headers = self.build_headers(token)?;

        tracing::debug!(%url, "GET");
        let response = self.client.get(&url).headers(headers).send().await?;

        self.handle_response_status(response).await
    }

    /// Make an authenticated GET request and deserialize JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, token: &OAuth2Token, path: &str) -> Result<T> {
        let response = self.get(token, path).await?;
        response.json().await.map_err(|e| {
            LocalDbError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Handle response status codes and convert to errors
    async fn handle_response_status(&self, response: Response) -> Result<Response> {
        let status = response.status();

        match status {
            s if s.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(LocalDbError::NotAuthenticated),
            StatusCode::TOO_MANY_REQUESTS => Err(LocalDbError::RateLimited),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(LocalDbError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
