//! Native driver links.
//!
//! A link owns exactly one driver connection (no pooling at this layer). The
//! connection sits behind an async mutex so a shared handle runs one statement at
//! a time, and can be taken out to close the link while other holders keep their
//! `Arc`.

use crate::config::{LinkOptions, OPT_JOURNAL_MODE, OPT_SSL_MODE};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DriverKind, Dsn, LinkInfo, SQLITE_MEMORY};
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, Executor};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Shared handle to an open link. Compare handles with [`Arc::ptr_eq`].
pub type ConnectionHandle = Arc<Link>;

/// Database-specific connection (avoids `AnyConnection` limitations).
#[derive(Debug)]
pub enum NativeConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl NativeConnection {
    /// Close the connection gracefully.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            Postgres(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
    }

    /// Run a statement through the simple-query path and discard its result.
    async fn execute_raw(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.execute(sql).await.map(|_| ()),
            Postgres(c) => c.execute(sql).await.map(|_| ()),
            SQLite(c) => c.execute(sql).await.map(|_| ()),
        })
    }
}

/// One open connection plus the metadata it was opened with.
#[derive(Debug)]
pub struct Link {
    name: String,
    kind: DriverKind,
    dsn: Dsn,
    opened_at: DateTime<Utc>,
    query_timeout: Option<Duration>,
    conn: Mutex<Option<NativeConnection>>,
}

impl Link {
    /// Open a new native connection for `config`.
    ///
    /// Option values are interpreted here; a malformed one fails the open with
    /// a connection error, like any driver failure. Nothing is cached.
    pub async fn open(config: &ConnectionConfig) -> DbResult<ConnectionHandle> {
        let options = &config.options;
        let connect_timeout = options
            .connect_timeout()
            .map_err(|e| option_error(config, e))?;
        let query_timeout = options
            .query_timeout()
            .map_err(|e| option_error(config, e))?;

        if !config.kind.is_postgres() {
            for (key, value) in options.unrecognized(config.kind) {
                warn!(name = %config.name, key, value, "Ignoring unknown link option");
            }
        }

        debug!(
            name = %config.name,
            kind = %config.kind,
            dsn = %config.dsn,
            connect_timeout = ?connect_timeout,
            "Opening link"
        );

        let connecting = connect_native(config);
        let mut conn = match connect_timeout {
            Some(limit) => timeout(limit, connecting).await.map_err(|_| {
                DbError::connection(
                    &config.name,
                    format!("Timed out after {:?} while connecting", limit),
                    "Check that the server is reachable or raise connect_timeout",
                )
            })??,
            None => connecting.await?,
        };

        if let Some(command) = options.init_command() {
            conn.execute_raw(command).await.map_err(|e| {
                DbError::connection(
                    &config.name,
                    format!("Init command failed: {}", e),
                    "Check the init_command option",
                )
            })?;
        }

        info!(name = %config.name, kind = %config.kind, dsn = %config.dsn, "Opened link");

        Ok(Arc::new(Self {
            name: config.name.clone(),
            kind: config.kind,
            dsn: config.dsn.clone(),
            opened_at: Utc::now(),
            query_timeout,
            conn: Mutex::new(Some(conn)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DriverKind {
        self.kind
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Per-statement limit from the `query_timeout` option.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    pub fn info(&self) -> LinkInfo {
        LinkInfo {
            name: self.name.clone(),
            kind: self.kind,
            dsn: self.dsn.clone(),
            opened_at: self.opened_at,
        }
    }

    /// True once the link has been dropped or replaced.
    pub async fn is_closed(&self) -> bool {
        self.conn.lock().await.is_none()
    }

    /// Lock the native connection for one statement.
    pub(crate) async fn acquire(&self) -> DbResult<MappedMutexGuard<'_, NativeConnection>> {
        MutexGuard::try_map(self.conn.lock().await, |conn| conn.as_mut())
            .map_err(|_| self.dropped())
    }

    /// Close the native connection. Later statements on this handle fail.
    ///
    /// Waits for a statement already running on the link. Closing twice is a no-op.
    pub async fn close(&self) -> DbResult<()> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        conn.close().await.map_err(|e| {
            DbError::connection(
                &self.name,
                format!("Failed to close link: {}", e),
                "The connection was discarded; open the link again if needed",
            )
        })
    }

    fn dropped(&self) -> DbError {
        DbError::connection(
            &self.name,
            "link was dropped",
            "Call get_link again to obtain the current handle",
        )
    }
}

fn option_error(config: &ConnectionConfig, err: DbError) -> DbError {
    DbError::connection(&config.name, err.to_string(), "Fix the link option value")
}

async fn connect_native(config: &ConnectionConfig) -> DbResult<NativeConnection> {
    let failed = |e: sqlx::Error| DbError::connect_failed(&config.name, config.kind, &e);
    match config.kind {
        DriverKind::MySql | DriverKind::MySqlSocket => {
            let options = mysql_options(config).map_err(|e| option_error(config, e))?;
            let conn = options.connect().await.map_err(failed)?;
            Ok(NativeConnection::MySql(conn))
        }
        DriverKind::Postgres | DriverKind::PostgresSocket => {
            let options = postgres_options(config).map_err(|e| option_error(config, e))?;
            let conn = options.connect().await.map_err(failed)?;
            Ok(NativeConnection::Postgres(conn))
        }
        DriverKind::SQLite => {
            let options = sqlite_options(config).map_err(|e| option_error(config, e))?;
            let conn = options.connect().await.map_err(failed)?;
            Ok(NativeConnection::SQLite(conn))
        }
    }
}

fn port(dsn: &Dsn) -> DbResult<Option<u16>> {
    dsn.fragment("port")
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| DbError::invalid_option("port", p, "expected a TCP port number"))
        })
        .transpose()
}

fn mysql_options(config: &ConnectionConfig) -> DbResult<MySqlConnectOptions> {
    let dsn = &config.dsn;
    let mut options = MySqlConnectOptions::new();

    if let Some(socket) = dsn.fragment("unix_socket") {
        options = options.socket(socket);
    }
    if let Some(host) = dsn.fragment("host") {
        options = options.host(host);
    }
    if let Some(port) = port(dsn)? {
        options = options.port(port);
    }
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = dsn.fragment("dbname") {
        options = options.database(database);
    }
    if let Some(charset) = config.options.charset() {
        options = options.charset(charset);
    }
    if let Some(mode) = config.options.ssl_mode() {
        let mode = MySqlSslMode::from_str(mode)
            .map_err(|e| DbError::invalid_option(OPT_SSL_MODE, mode, e.to_string()))?;
        options = options.ssl_mode(mode);
    }
    Ok(options)
}

fn postgres_options(config: &ConnectionConfig) -> DbResult<PgConnectOptions> {
    let dsn = &config.dsn;
    let mut options = PgConnectOptions::new();

    if let Some(socket) = dsn.fragment("unix_socket") {
        options = options.socket(socket);
    }
    if let Some(host) = dsn.fragment("host") {
        options = options.host(host);
    }
    if let Some(port) = port(dsn)? {
        options = options.port(port);
    }
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = dsn.fragment("dbname") {
        options = options.database(database);
    }
    if let Some(name) = config.options.application_name() {
        options = options.application_name(name);
    }
    if let Some(mode) = config.options.ssl_mode() {
        let mode = PgSslMode::from_str(mode)
            .map_err(|e| DbError::invalid_option(OPT_SSL_MODE, mode, e.to_string()))?;
        options = options.ssl_mode(mode);
    }

    // Everything else goes to the server as a runtime parameter.
    let runtime: Vec<(&str, &str)> = config.options.unrecognized(config.kind).collect();
    if !runtime.is_empty() {
        options = options.options(runtime);
    }
    Ok(options)
}

fn sqlite_options(config: &ConnectionConfig) -> DbResult<SqliteConnectOptions> {
    let path = config.dsn.body();
    let link_options: &LinkOptions = &config.options;

    let mut options = if path == SQLITE_MEMORY {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::invalid_option("path", path, e.to_string()))?
    } else {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(link_options.create_if_missing_or_default()?)
            .read_only(link_options.read_only_or_default()?)
    };

    if let Some(enabled) = link_options.foreign_keys()? {
        options = options.foreign_keys(enabled);
    }
    if let Some(busy) = link_options.busy_timeout()? {
        options = options.busy_timeout(busy);
    }
    if let Some(mode) = link_options.journal_mode() {
        let mode = SqliteJournalMode::from_str(mode)
            .map_err(|e| DbError::invalid_option(OPT_JOURNAL_MODE, mode, e.to_string()))?;
        options = options.journal_mode(mode);
    }
    Ok(options)
}
