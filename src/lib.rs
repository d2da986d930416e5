//! SQL Link Pool Library
//!
//! This library keeps named database links (MySQL, PostgreSQL, SQLite) and runs
//! queries on them, reshaping results into row counts, rows, columns or scalars.
//!
//! ```no_run
//! # async fn demo() -> sql_link_pool::DbResult<()> {
//! use sql_link_pool::LinkPool;
//!
//! let pool = LinkPool::new();
//! pool.add_sqlite("main", ":memory:", None)?;
//! pool.execute("CREATE TABLE t (id INTEGER)", (), None).await?;
//! let ids = pool.fetch_column("SELECT id FROM t", (), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{LinkOptions, LinkSpec};
pub use db::{ConnectionHandle, LinkPool, QueryExecutor};
pub use error::{DbError, DbResult};
pub use models::{
    ConnectionConfig, DriverKind, Endpoint, LinkInfo, Params, QueryOutput, QueryParam,
    ResultShape, Row,
};
