//! Garmin Connect HTTP access

pub mod api;
pub mod tokens;

pub use api::GarminClient;
pub use tokens::OAuth2Token;
