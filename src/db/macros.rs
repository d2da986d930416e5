//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! implementations while maintaining linear readability. The macros expand
//! at compile time with zero runtime overhead.

use crate::models::DriverKind;

/// Database backend family, used where TCP and socket variants behave alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    MySql,
    Postgres,
    SQLite,
}

impl From<DriverKind> for DatabaseType {
    fn from(kind: DriverKind) -> Self {
        match kind {
            DriverKind::MySql | DriverKind::MySqlSocket => Self::MySql,
            DriverKind::Postgres | DriverKind::PostgresSocket => Self::Postgres,
            DriverKind::SQLite => Self::SQLite,
        }
    }
}

/// Macro for generating native connection dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => do_mysql(c),
///     Postgres(c) => do_postgres(c),
///     SQLite(c) => do_sqlite(c),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::link::NativeConnection::$variant($c) => $body,
            )+
        }
    };
}

/// Macro for running one statement on a native connection and shaping the result.
///
/// Expands to an `async` block; every driver gets the same shaping logic with its
/// own bind function and row type.
#[macro_export]
macro_rules! impl_shape_query {
    ($conn:expr, $sql:expr, $values:expr, $shape:expr, $bind:path) => {
        async move {
            use $crate::db::types::RowToJson as _;
            use $crate::models::{QueryOutput, ResultShape};
            use futures_util::TryStreamExt as _;

            let mut query = sqlx::query($sql);
            for value in $values {
                query = $bind(query, value);
            }

            let output = match $shape {
                ResultShape::AffectedRowCount => {
                    QueryOutput::RowCount(query.execute($conn).await?.rows_affected())
                }
                ResultShape::AllRows => QueryOutput::Rows(
                    query
                        .fetch_all($conn)
                        .await?
                        .iter()
                        .map(|row| row.to_json_map())
                        .collect(),
                ),
                ResultShape::FirstRow => QueryOutput::Row(
                    query
                        .fetch_optional($conn)
                        .await?
                        .map(|row| row.to_json_map())
                        .unwrap_or_default(),
                ),
                ResultShape::FirstColumnAllRows => QueryOutput::Column(
                    query
                        .fetch($conn)
                        .map_ok(|row| row.first_value().unwrap_or(serde_json::Value::Null))
                        .try_collect()
                        .await?,
                ),
                ResultShape::FirstCellOfFirstRow => QueryOutput::Scalar(
                    query
                        .fetch_optional($conn)
                        .await?
                        .and_then(|row| row.first_value()),
                ),
            };
            Ok::<_, $crate::error::DbError>(output)
        }
    };
}

pub use impl_db_dispatch;
pub use impl_shape_query;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_driver_kind() {
        assert_eq!(DatabaseType::from(DriverKind::MySqlSocket), DatabaseType::MySql);
        assert_eq!(DatabaseType::from(DriverKind::Postgres), DatabaseType::Postgres);
        assert_eq!(DatabaseType::from(DriverKind::SQLite), DatabaseType::SQLite);
    }

    #[test]
    fn test_database_type_equality() {
        assert_eq!(DatabaseType::MySql, DatabaseType::MySql);
        assert_ne!(DatabaseType::MySql, DatabaseType::Postgres);
    }
}
