//! Entity types and table definitions for the local store

pub mod models;
pub mod schema;

pub use models::*;
pub use schema::SchemaInfo;
