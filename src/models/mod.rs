//! Data models for the link pool.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, DriverKind, Dsn, Endpoint, LinkInfo, MYSQL_SCHEME, POSTGRES_SCHEME,
    SQLITE_MEMORY, SQLITE_SCHEME, validate_name,
};
pub use query::{Params, QueryOutput, QueryParam, ResultShape, Row};
