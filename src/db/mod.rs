//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Named link registry and cache
//! - Native driver links
//! - Query execution and result shaping
//! - Named parameter rewriting and binding
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod executor;
pub mod link;
pub mod params;
pub mod pool;
pub mod types;

pub use executor::QueryExecutor;
pub use link::{ConnectionHandle, Link, NativeConnection};
pub use macros::DatabaseType;
pub use params::{BoundStatement, bind_statement};
pub use pool::LinkPool;
