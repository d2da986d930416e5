//! Error types for the link pool.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver failures keep the underlying message (and SQLSTATE where the driver reports
//! one) together with a short suggestion for the caller.

use crate::models::DriverKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unknown connection name: {name}")]
    UnknownConnectionName { name: String },

    #[error("Connection '{name}' failed: {message}")]
    Connection {
        name: String,
        message: String,
        suggestion: String,
    },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid connection name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid option {key}={value}: {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid connection URL: {message}")]
    InvalidUrl { message: String },
}

impl DbError {
    /// Create an unknown connection name error.
    pub fn unknown_name(name: impl Into<String>) -> Self {
        Self::UnknownConnectionName { name: name.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            name: name.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid option error.
    pub fn invalid_option(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    /// Wrap a driver failure raised while opening the link `name`.
    pub fn connect_failed(name: &str, kind: DriverKind, err: &sqlx::Error) -> Self {
        Self::connection(
            name,
            format!("Failed to connect: {}", err),
            connection_suggestion(kind, err),
        )
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Get the SQLSTATE reported by the driver, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only connection failures qualify, and only after the caller fixed whatever
    /// made the open fail. Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors raised by statements into query errors.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, constraints and referenced objects",
                )
            }
            sqlx::Error::ColumnNotFound(col) => DbError::query(
                format!("Column not found: {}", col),
                None,
                "Check the selected column names",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::query(
                format!("Column index {} out of bounds (len: {})", index, len),
                None,
                "The statement returned fewer columns than expected",
            ),
            sqlx::Error::ColumnDecode { index, source } => DbError::query(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Check the column types",
            ),
            sqlx::Error::Decode(source) => DbError::query(
                format!("Decode error: {}", source),
                None,
                "Check the column types",
            ),
            sqlx::Error::Encode(source) => DbError::query(
                format!("Failed to encode parameter: {}", source),
                None,
                "Check the bound parameter types",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::query(
                format!("Type not found: {}", type_name),
                None,
                "Check the referenced types",
            ),
            sqlx::Error::Io(io_err) => DbError::query(
                format!("I/O error: {}", io_err),
                None,
                "The link may be broken; drop it and open a new one",
            ),
            sqlx::Error::Protocol(msg) => DbError::query(
                format!("Protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            _ => DbError::query(
                format!("Database error: {}", err),
                None,
                "Check the statement and its parameters",
            ),
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(kind: DriverKind, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return match kind.default_port() {
            Some(port) => format!(
                "Check that the {} server is running and accessible (default port {})",
                kind, port
            ),
            None => format!("Check that the {} server is running and accessible", kind),
        };
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("access denied")
    {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match kind {
        DriverKind::MySql | DriverKind::Postgres => {
            "Verify the host name and port are reachable".to_string()
        }
        DriverKind::MySqlSocket | DriverKind::PostgresSocket => {
            "Verify the socket path exists and is accessible".to_string()
        }
        DriverKind::SQLite => {
            "Verify the file path exists and is accessible, or set create_if_missing=true"
                .to_string()
        }
    }
}

/// Result type alias for pool operations.
pub type DbResult<T> = Result<T, DbError>;
