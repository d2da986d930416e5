//! Query execution engine.
//!
//! This module runs one statement on a link and reshapes the result:
//! - Named parameters are rewritten into driver placeholders
//! - Statements are always prepared, with or without parameters
//! - The link's query timeout bounds the whole round trip
//!
//! Each driver gets the same shaping logic through `impl_shape_query!`, adapted
//! to its own bind function and row type.

use crate::db::DatabaseType;
use crate::db::link::Link;
use crate::db::params::{
    bind_mysql_param, bind_postgres_param, bind_sqlite_param, bind_statement,
};
use crate::error::{DbError, DbResult};
use crate::models::{Params, QueryOutput, ResultShape};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Stateless query executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor;

impl QueryExecutor {
    /// Run `sql` on `link` and return the result in `shape`.
    pub async fn run(
        link: &Link,
        sql: &str,
        params: Params,
        shape: ResultShape,
    ) -> DbResult<QueryOutput> {
        let statement = bind_statement(sql, params, DatabaseType::from(link.kind()))?;
        let sql: &str = &statement.sql;
        let values = &statement.values;

        debug!(
            name = %link.name(),
            sql = %sql,
            params = values.len(),
            shape = ?shape,
            "Executing query"
        );

        let mut conn = link.acquire().await?;
        let running = async {
            impl_db_dispatch!(&mut *conn, {
                MySql(c) => impl_shape_query!(c, sql, values, shape, bind_mysql_param).await,
                Postgres(c) => impl_shape_query!(c, sql, values, shape, bind_postgres_param).await,
                SQLite(c) => impl_shape_query!(c, sql, values, shape, bind_sqlite_param).await,
            })
        };

        match link.query_timeout() {
            Some(limit) => timeout(limit, running)
                .await
                .map_err(|_| timeout_error(limit))?,
            None => running.await,
        }
    }
}

fn timeout_error(limit: Duration) -> DbError {
    DbError::query(
        format!("Query timed out after {:?}", limit),
        None,
        "Simplify the statement or raise query_timeout",
    )
}

/// Error for an output that does not match the shape it was requested with.
pub(crate) fn shape_mismatch(expected: ResultShape, output: &QueryOutput) -> DbError {
    DbError::query(
        format!(
            "Expected {:?} output, got {:?}",
            expected,
            output.shape()
        ),
        None,
        "Use run_query to receive the raw output",
    )
}
