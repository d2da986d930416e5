//! Named link management.
//!
//! This module provides the link pool: a registry of connection configs keyed by
//! name, and a cache of open links filled lazily on first use.

use crate::config::{LinkOptions, LinkSpec};
use crate::db::executor::{QueryExecutor, shape_mismatch};
use crate::db::link::{ConnectionHandle, Link};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, Endpoint, LinkInfo, Params, QueryOutput, ResultShape, Row,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Registered configs plus the order names were first added in.
#[derive(Debug, Default)]
struct Registry {
    configs: HashMap<String, ConnectionConfig>,
    order: Vec<String>,
}

/// Registry of named connection configs and the links opened from them.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct LinkPool {
    registry: Arc<StdRwLock<Registry>>,
    links: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl LinkPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide pool, created on first access.
    pub fn global() -> &'static LinkPool {
        static GLOBAL: OnceLock<LinkPool> = OnceLock::new();
        GLOBAL.get_or_init(LinkPool::new)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `endpoint` under `name`.
    ///
    /// Re-adding a name replaces its config but keeps its registration position.
    /// Links already open under the name are left as they are.
    pub fn add(
        &self,
        name: &str,
        endpoint: Endpoint,
        options: Option<LinkOptions>,
    ) -> DbResult<&Self> {
        let config = ConnectionConfig::new(name, &endpoint, options)?;
        debug!(name = %config.name, kind = %config.kind, dsn = %config.dsn, "Registered link");

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if !registry.configs.contains_key(&config.name) {
            registry.order.push(config.name.clone());
        }
        registry.configs.insert(config.name.clone(), config);
        Ok(self)
    }

    /// Register a MySQL server reached over TCP.
    #[allow(clippy::too_many_arguments)]
    pub fn add_mysql(
        &self,
        name: &str,
        host: &str,
        user: Option<&str>,
        pass: Option<&str>,
        database: Option<&str>,
        options: Option<LinkOptions>,
        port: Option<u16>,
    ) -> DbResult<&Self> {
        self.add(
            name,
            Endpoint::MySql {
                host: host.to_string(),
                port,
                username: user.map(String::from),
                password: pass.map(String::from),
                database: database.map(String::from),
            },
            options,
        )
    }

    /// Register a MySQL server reached over a Unix socket.
    pub fn add_mysql_socket(
        &self,
        name: &str,
        socket: &str,
        user: Option<&str>,
        pass: Option<&str>,
        database: Option<&str>,
        options: Option<LinkOptions>,
    ) -> DbResult<&Self> {
        self.add(
            name,
            Endpoint::MySqlSocket {
                socket: socket.to_string(),
                username: user.map(String::from),
                password: pass.map(String::from),
                database: database.map(String::from),
            },
            options,
        )
    }

    /// Register a PostgreSQL server reached over TCP.
    #[allow(clippy::too_many_arguments)]
    pub fn add_postgres(
        &self,
        name: &str,
        host: &str,
        user: Option<&str>,
        pass: Option<&str>,
        database: Option<&str>,
        options: Option<LinkOptions>,
        port: Option<u16>,
    ) -> DbResult<&Self> {
        self.add(
            name,
            Endpoint::Postgres {
                host: host.to_string(),
                port,
                username: user.map(String::from),
                password: pass.map(String::from),
                database: database.map(String::from),
            },
            options,
        )
    }

    /// Register a PostgreSQL server reached over a Unix socket.
    pub fn add_postgres_socket(
        &self,
        name: &str,
        socket: &str,
        user: Option<&str>,
        pass: Option<&str>,
        database: Option<&str>,
        options: Option<LinkOptions>,
    ) -> DbResult<&Self> {
        self.add(
            name,
            Endpoint::PostgresSocket {
                socket: socket.to_string(),
                username: user.map(String::from),
                password: pass.map(String::from),
                database: database.map(String::from),
            },
            options,
        )
    }

    /// Register a SQLite database file, or `:memory:`.
    pub fn add_sqlite(
        &self,
        name: &str,
        path: &str,
        options: Option<LinkOptions>,
    ) -> DbResult<&Self> {
        self.add(
            name,
            Endpoint::Sqlite {
                path: path.to_string(),
            },
            options,
        )
    }

    /// Register a link parsed with [`LinkSpec::parse`].
    pub fn add_spec(&self, spec: LinkSpec) -> DbResult<&Self> {
        let options = (!spec.options.is_empty()).then_some(spec.options);
        self.add(&spec.name, spec.endpoint, options)
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Resolve an optional name; `None` or `""` means the first name registered.
    pub fn resolve_name(&self, name: Option<&str>) -> DbResult<String> {
        match name.filter(|n| !n.is_empty()) {
            Some(name) => Ok(name.to_string()),
            None => self
                .default_name()
                .ok_or_else(|| DbError::unknown_name("(default)")),
        }
    }

    /// Return the cached link for `name`, opening it on first use.
    pub async fn get_link(&self, name: Option<&str>) -> DbResult<ConnectionHandle> {
        let name = self.resolve_name(name)?;

        let cached = self.links.read().await.get(&name).cloned();
        if let Some(handle) = cached {
            debug!(name = %name, "Link cache hit");
            return Ok(handle);
        }

        let config = self.config(&name)?;
        let handle = Link::open(&config).await?;

        // Re-check after the open to prevent a TOCTOU race. If another task
        // installed a link meanwhile, keep theirs and close ours outside the lock.
        let installed = {
            let mut links = self.links.write().await;
            match links.get(&name) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    links.insert(name.clone(), Arc::clone(&handle));
                    None
                }
            }
        }; // Lock released here

        if let Some(existing) = installed {
            debug!(name = %name, "Concurrent open detected, keeping the installed link");
            if let Err(e) = handle.close().await {
                warn!(name = %name, error = %e, "Failed to close duplicate link");
            }
            return Ok(existing);
        }
        Ok(handle)
    }

    /// Open a fresh link for `name` and make it the cached one.
    ///
    /// A previously cached link is closed; holders of the old handle get a
    /// connection error on their next statement.
    pub async fn open_link(&self, name: Option<&str>) -> DbResult<ConnectionHandle> {
        let name = self.resolve_name(name)?;
        let config = self.config(&name)?;
        let handle = Link::open(&config).await?;

        let replaced = self
            .links
            .write()
            .await
            .insert(name.clone(), Arc::clone(&handle));

        if let Some(old) = replaced {
            warn!(name = %name, opened_at = %old.opened_at(), "Replacing open link");
            if let Err(e) = old.close().await {
                warn!(name = %name, error = %e, "Failed to close replaced link");
            }
        }
        Ok(handle)
    }

    /// Forget the cached link for `name` and close it. No-op when none is open.
    pub async fn drop_link(&self, name: Option<&str>) -> DbResult<()> {
        let name = self.resolve_name(name)?;
        let removed = self.links.write().await.remove(&name);
        if let Some(handle) = removed {
            handle.close().await?;
            info!(name = %name, "Dropped link");
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run `sql` on the link for `name` and shape the result.
    pub async fn run_query(
        &self,
        sql: &str,
        params: impl Into<Params>,
        shape: ResultShape,
        name: Option<&str>,
    ) -> DbResult<QueryOutput> {
        let handle = self.get_link(name).await?;
        QueryExecutor::run(&handle, sql, params.into(), shape).await
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl Into<Params>,
        name: Option<&str>,
    ) -> DbResult<u64> {
        let shape = ResultShape::AffectedRowCount;
        match self.run_query(sql, params, shape, name).await? {
            QueryOutput::RowCount(count) => Ok(count),
            other => Err(shape_mismatch(shape, &other)),
        }
    }

    /// Fetch every row.
    pub async fn fetch_all(
        &self,
        sql: &str,
        params: impl Into<Params>,
        name: Option<&str>,
    ) -> DbResult<Vec<Row>> {
        let shape = ResultShape::AllRows;
        match self.run_query(sql, params, shape, name).await? {
            QueryOutput::Rows(rows) => Ok(rows),
            other => Err(shape_mismatch(shape, &other)),
        }
    }

    /// Fetch the first row; empty when the statement returned none.
    pub async fn fetch_row(
        &self,
        sql: &str,
        params: impl Into<Params>,
        name: Option<&str>,
    ) -> DbResult<Row> {
        let shape = ResultShape::FirstRow;
        match self.run_query(sql, params, shape, name).await? {
            QueryOutput::Row(row) => Ok(row),
            other => Err(shape_mismatch(shape, &other)),
        }
    }

    /// Fetch the first column of every row.
    pub async fn fetch_column(
        &self,
        sql: &str,
        params: impl Into<Params>,
        name: Option<&str>,
    ) -> DbResult<Vec<JsonValue>> {
        let shape = ResultShape::FirstColumnAllRows;
        match self.run_query(sql, params, shape, name).await? {
            QueryOutput::Column(values) => Ok(values),
            other => Err(shape_mismatch(shape, &other)),
        }
    }

    /// Fetch the first cell of the first row; `None` when there are no rows.
    pub async fn fetch_scalar(
        &self,
        sql: &str,
        params: impl Into<Params>,
        name: Option<&str>,
    ) -> DbResult<Option<JsonValue>> {
        let shape = ResultShape::FirstCellOfFirstRow;
        match self.run_query(sql, params, shape, name).await? {
            QueryOutput::Scalar(value) => Ok(value),
            other => Err(shape_mismatch(shape, &other)),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// The first name ever registered.
    pub fn default_name(&self) -> Option<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .first()
            .cloned()
    }

    /// Get the registered configuration for `name`.
    pub fn config(&self, name: &str) -> DbResult<ConnectionConfig> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::unknown_name(name))
    }

    /// Check if a link is cached for `name`.
    pub async fn is_open(&self, name: &str) -> bool {
        self.links.read().await.contains_key(name)
    }

    /// Snapshots of the cached links, in registration order.
    pub async fn open_links(&self) -> Vec<LinkInfo> {
        let order = self.names();
        let links = self.links.read().await;
        order
            .iter()
            .filter_map(|name| links.get(name))
            .map(|link| link.info())
            .collect()
    }

    /// Close every cached link and clear the cache. Configs stay registered.
    pub async fn close_all(&self) {
        let drained: Vec<(String, ConnectionHandle)> =
            self.links.write().await.drain().collect();
        for (name, handle) in drained {
            info!(name = %name, "Closing link");
            if let Err(e) = handle.close().await {
                warn!(name = %name, error = %e, "Failed to close link");
            }
        }
        info!("All links closed");
    }
}
