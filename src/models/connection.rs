//! Connection-related data models.
//!
//! This module defines the per-name connection descriptor: which driver family it
//! targets, the DSN assembled for it, credentials and driver options.

use crate::config::LinkOptions;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// Scheme token for MySQL DSNs.
pub const MYSQL_SCHEME: &str = "mysql";
/// Scheme token for PostgreSQL DSNs.
pub const POSTGRES_SCHEME: &str = "pgsql";
/// Scheme token for SQLite DSNs.
pub const SQLITE_SCHEME: &str = "sqlite";
/// Path that selects a private in-memory SQLite database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Supported driver kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// MySQL (includes MariaDB) over TCP
    #[serde(rename = "mysql")]
    MySql,
    /// MySQL over a Unix domain socket
    #[serde(rename = "mysql_socket")]
    MySqlSocket,
    /// PostgreSQL over TCP
    Postgres,
    /// PostgreSQL over a Unix domain socket
    PostgresSocket,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl DriverKind {
    /// Get the display name of the database family.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql | Self::MySqlSocket => "MySQL",
            Self::Postgres | Self::PostgresSocket => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }

    /// DSN scheme token for this driver family.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::MySql | Self::MySqlSocket => MYSQL_SCHEME,
            Self::Postgres | Self::PostgresSocket => POSTGRES_SCHEME,
            Self::SQLite => SQLITE_SCHEME,
        }
    }

    /// Get the default port for this driver kind.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
            _ => None,
        }
    }

    pub fn is_mysql(&self) -> bool {
        matches!(self, Self::MySql | Self::MySqlSocket)
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, Self::Postgres | Self::PostgresSocket)
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where and how to reach a database, one variant per driver kind.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum Endpoint {
    #[serde(rename = "mysql")]
    MySql {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        username: Option<String>,
        /// Contains sensitive data - never log
        #[serde(default, skip_serializing)]
        password: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
    #[serde(rename = "mysql_socket")]
    MySqlSocket {
        /// Empty means the driver's default socket resolution
        #[serde(default)]
        socket: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default, skip_serializing)]
        password: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
    Postgres {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default, skip_serializing)]
        password: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
    PostgresSocket {
        #[serde(default)]
        socket: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default, skip_serializing)]
        password: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
    Sqlite {
        /// File path, or `:memory:`
        path: String,
    },
}

impl Endpoint {
    /// Driver kind this endpoint targets.
    pub fn kind(&self) -> DriverKind {
        match self {
            Self::MySql { .. } => DriverKind::MySql,
            Self::MySqlSocket { .. } => DriverKind::MySqlSocket,
            Self::Postgres { .. } => DriverKind::Postgres,
            Self::PostgresSocket { .. } => DriverKind::PostgresSocket,
            Self::Sqlite { .. } => DriverKind::SQLite,
        }
    }

    /// Database name, when one is targeted.
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::MySql { database, .. }
            | Self::MySqlSocket { database, .. }
            | Self::Postgres { database, .. }
            | Self::PostgresSocket { database, .. } => database.as_deref(),
            Self::Sqlite { .. } => None,
        }
    }

    /// Assemble the DSN for this endpoint.
    ///
    /// Fragments are only emitted for inputs that are present and non-empty.
    pub fn dsn(&self) -> Dsn {
        let scheme = self.kind().scheme();
        match self {
            Self::MySql {
                host,
                port,
                database,
                ..
            }
            | Self::Postgres {
                host,
                port,
                database,
                ..
            } => Dsn::assemble(
                scheme,
                [
                    ("host", Some(host.clone())),
                    ("port", port.map(|p| p.to_string())),
                    ("dbname", database.clone()),
                ],
            ),
            Self::MySqlSocket {
                socket, database, ..
            }
            | Self::PostgresSocket {
                socket, database, ..
            } => Dsn::assemble(
                scheme,
                [
                    ("unix_socket", Some(socket.clone())),
                    ("dbname", database.clone()),
                ],
            ),
            Self::Sqlite { path } => Dsn(format!("{}:{}", scheme, path)),
        }
    }

    /// Split off the credentials. SQLite never carries any.
    fn credentials(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::MySql {
                username, password, ..
            }
            | Self::MySqlSocket {
                username, password, ..
            }
            | Self::Postgres {
                username, password, ..
            }
            | Self::PostgresSocket {
                username, password, ..
            } => (non_empty(username.clone()), non_empty(password.clone())),
            Self::Sqlite { .. } => (None, None),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The DSN never includes credentials.
        f.debug_tuple("Endpoint").field(&self.dsn().as_str()).finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A driver connection string such as `mysql:host=db;port=3306;dbname=app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dsn(String);

impl Dsn {
    fn assemble<const N: usize>(scheme: &str, fragments: [(&str, Option<String>); N]) -> Self {
        let body: Vec<String> = fragments
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{}={}", key, v))
            })
            .collect();
        Dsn(format!("{}:{}", scheme, body.join(";")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scheme token before the first `:`.
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(scheme, _)| scheme)
    }

    /// Everything after the scheme token.
    pub fn body(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, body)| body)
    }

    /// Look up a `key=value` fragment. Not meaningful for SQLite DSNs.
    pub fn fragment(&self, key: &str) -> Option<&str> {
        self.body()
            .split(';')
            .filter_map(|part| part.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

impl std::fmt::Display for Dsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for one named connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub kind: DriverKind,
    pub dsn: Dsn,
    #[serde(default)]
    pub username: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Driver options, already merged with the family defaults.
    #[serde(default)]
    pub options: LinkOptions,
}

impl ConnectionConfig {
    /// Create a connection configuration from an endpoint.
    ///
    /// Caller options are layered over the driver family defaults.
    pub fn new(
        name: impl Into<String>,
        endpoint: &Endpoint,
        options: Option<LinkOptions>,
    ) -> DbResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        let kind = endpoint.kind();
        let (username, password) = endpoint.credentials();
        let options = LinkOptions::defaults_for(kind).merged(options.unwrap_or_default());

        Ok(Self {
            name,
            kind,
            dsn: endpoint.dsn(),
            username,
            password,
            options,
        })
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("dsn", &self.dsn)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("options", &self.options)
            .finish()
    }
}

/// Check that a connection name is a usable identifier.
pub fn validate_name(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_name(name, "name cannot be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(DbError::invalid_name(
            name,
            "only letters, digits, '-', '_' and '.' are allowed",
        ));
    }
    Ok(())
}

/// Snapshot of an open link, returned by introspection calls.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    pub name: String,
    pub kind: DriverKind,
    pub dsn: Dsn,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql(host: &str, port: Option<u16>, database: Option<&str>) -> Endpoint {
        Endpoint::MySql {
            host: host.to_string(),
            port,
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: database.map(String::from),
        }
    }

    #[test]
    fn test_mysql_dsn_fragments() {
        assert_eq!(
            mysql("db.local", Some(3307), Some("shop")).dsn().as_str(),
            "mysql:host=db.local;port=3307;dbname=shop"
        );
        assert_eq!(mysql("db.local", None, None).dsn().as_str(), "mysql:host=db.local");
        assert_eq!(
            mysql("db.local", None, Some("")).dsn().as_str(),
            "mysql:host=db.local"
        );
    }

    #[test]
    fn test_postgres_socket_dsn() {
        let endpoint = Endpoint::PostgresSocket {
            socket: "/var/run/postgresql".to_string(),
            username: None,
            password: None,
            database: Some("app".to_string()),
        };
        assert_eq!(
            endpoint.dsn().as_str(),
            "pgsql:unix_socket=/var/run/postgresql;dbname=app"
        );
    }

    #[test]
    fn test_empty_socket_falls_back_to_bare_scheme() {
        let endpoint = Endpoint::MySqlSocket {
            socket: String::new(),
            username: None,
            password: None,
            database: None,
        };
        assert_eq!(endpoint.dsn().as_str(), "mysql:");
        assert_eq!(endpoint.dsn().fragment("unix_socket"), None);
    }

    #[test]
    fn test_sqlite_dsn_is_path() {
        let endpoint = Endpoint::Sqlite {
            path: SQLITE_MEMORY.to_string(),
        };
        let dsn = endpoint.dsn();
        assert_eq!(dsn.as_str(), "sqlite::memory:");
        assert_eq!(dsn.scheme(), "sqlite");
        assert_eq!(dsn.body(), ":memory:");
    }

    #[test]
    fn test_dsn_fragment_lookup() {
        let dsn = mysql("h", Some(1234), Some("d")).dsn();
        assert_eq!(dsn.fragment("host"), Some("h"));
        assert_eq!(dsn.fragment("port"), Some("1234"));
        assert_eq!(dsn.fragment("dbname"), Some("d"));
        assert_eq!(dsn.fragment("unix_socket"), None);
    }

    #[test]
    fn test_config_merges_mysql_defaults() {
        let config = ConnectionConfig::new("main", &mysql("h", None, None), None).unwrap();
        assert_eq!(config.kind, DriverKind::MySql);
        assert_eq!(config.options.init_command(), Some("SET NAMES utf8mb4"));

        let mut overrides = LinkOptions::new();
        overrides.insert("init_command", "SET NAMES latin1");
        let config =
            ConnectionConfig::new("main", &mysql("h", None, None), Some(overrides)).unwrap();
        assert_eq!(config.options.init_command(), Some("SET NAMES latin1"));
    }

    #[test]
    fn test_sqlite_config_has_no_credentials() {
        let endpoint = Endpoint::Sqlite {
            path: "data.db".to_string(),
        };
        let config = ConnectionConfig::new("local", &endpoint, None).unwrap();
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_config_debug_masks_password() {
        let config = ConnectionConfig::new("main", &mysql("h", None, None), None).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_config_serialization_skips_password() {
        let config = ConnectionConfig::new("main", &mysql("h", None, None), None).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("mysql:host=h"));
    }

    #[test]
    fn test_endpoint_deserializes_from_tagged_json() {
        let endpoint: Endpoint = serde_json::from_value(serde_json::json!({
            "driver": "postgres",
            "host": "pg",
            "port": 5433,
            "username": "u",
            "password": "p",
        }))
        .unwrap();
        assert_eq!(endpoint.kind(), DriverKind::Postgres);
        assert_eq!(endpoint.dsn().as_str(), "pgsql:host=pg;port=5433");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("main").is_ok());
        assert!(validate_name("reports.v2-read_only").is_ok());
        assert!(matches!(
            validate_name(""),
            Err(DbError::InvalidName { .. })
        ));
        assert!(matches!(
            validate_name("two words"),
            Err(DbError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_driver_kind_display() {
        assert_eq!(DriverKind::MySqlSocket.to_string(), "MySQL");
        assert_eq!(DriverKind::Postgres.to_string(), "PostgreSQL");
        assert_eq!(DriverKind::SQLite.scheme(), "sqlite");
        assert_eq!(DriverKind::MySql.default_port(), Some(3306));
    }
}
