use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{Hook, Pool};
use derive_more::{Deref, DerefMut};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::scoped_futures::ScopedBoxFuture;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use super::custom_hooks;
use crate::{
    ConnectionPool, PgConfig, PgError, PgResult, PooledConnection, TRACING_TARGET_CLIENT,
    TRACING_TARGET_CONNECTION, TenantContext, TenantRouting,
};

/// Connection pool status information.
#[derive(Debug, Clone)]
pub struct PgPoolStatus {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Current number of connections in the pool
    pub size: usize,
    /// Number of available connections
    pub available: usize,
    /// Number of requests waiting for connections
    pub waiting: usize,
}

impl PgPoolStatus {
    /// Returns the number of connections currently checked out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }

    /// Returns the utilization percentage of the pool (0.0 to 1.0).
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.in_use() as f64 / self.max_size as f64
        }
    }

    /// Returns whether the pool is under pressure (high utilization or waiting requests).
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.waiting > 0 || self.utilization() > 0.8
    }
}

/// Tenant-aware database client owning the connection pool.
///
/// Every physical connection the pool opens is scoped to the tenant selected
/// by the task that triggered its creation (see [`TenantContext`]). With
/// [`TenantRouting::OnCheckout`], reused connections are re-scoped to the
/// tenant of the task checking them out.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct PgClient {
    inner: Arc<PgClientInner>,
}

/// Inner data for PgClient
struct PgClientInner {
    pool: ConnectionPool,
    config: PgConfig,
}

impl PgClient {
    /// Creates a new database client with the provided configuration.
    ///
    /// Connections are opened lazily, on first checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    ///
    /// - The connection URL cannot be assembled
    /// - Pool configuration is invalid
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CLIENT,
        fields(database_url = %config.database_url_masked())
    )]
    pub fn new(config: PgConfig) -> PgResult<Self> {
        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            tenant_routing = %config.tenant_routing(),
            "Initializing database client"
        );

        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup = Box::new(custom_hooks::setup_callback);
        let manager =
            AsyncDieselConnectionManager::new_with_config(config.database_url()?, manager_config);

        let post_recycle: Hook<AsyncDieselConnectionManager<AsyncPgConnection>> =
            match config.tenant_routing() {
                TenantRouting::OnConnect => Hook::sync_fn(custom_hooks::post_recycle),
                TenantRouting::OnCheckout => Hook::async_fn(custom_hooks::rescope_on_checkout),
            };

        let pool = Pool::builder(manager)
            .max_size(config.postgres_max_connections as usize)
            .wait_timeout(config.connection_timeout())
            .create_timeout(config.connection_timeout())
            .recycle_timeout(config.recycle_timeout())
            .runtime(deadpool::Runtime::Tokio1)
            .post_create(Hook::sync_fn(custom_hooks::post_create))
            .pre_recycle(Hook::sync_fn(custom_hooks::pre_recycle))
            .post_recycle(post_recycle)
            .build()
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET_CLIENT, error = %e, "Failed to create connection pool");
                PgError::Unexpected(format!("Failed to build connection pool: {}", e).into())
            })?;

        Ok(Self {
            inner: Arc::new(PgClientInner { pool, config }),
        })
    }

    /// Creates a new database client and verifies connectivity.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    ///
    /// - The database connection cannot be established
    /// - Pool configuration is invalid
    /// - Database connectivity test fails
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CLIENT,
        fields(database_url = %config.database_url_masked())
    )]
    pub async fn new_with_test(config: PgConfig) -> PgResult<Self> {
        let this = Self::new(config)?;
        this.ping().await?;

        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            max_connections = this.inner.config.postgres_max_connections,
            connection_timeout_secs = this.inner.config.postgres_connection_timeout_secs,
            recycle_timeout_secs = this.inner.config.postgres_recycle_timeout_secs,
            "Database client initialized successfully"
        );

        Ok(this)
    }

    /// Runs `SELECT 1` on a pooled connection.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub async fn ping(&self) -> PgResult<()> {
        tracing::debug!(target: TRACING_TARGET_CONNECTION, "Testing database connectivity");
        let mut conn = self.get_connection().await?;

        #[derive(diesel::QueryableByName)]
        struct ConnectivityTest {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            #[allow(dead_code)]
            result: i32,
        }

        let _: ConnectivityTest = diesel::sql_query("SELECT 1 as result")
            .get_result(&mut **conn)
            .await
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET_CONNECTION, error = %e, "Database connectivity test failed");
                PgError::from(e)
            })?;

        Ok(())
    }

    /// Checks out a connection scoped to the current task's tenant.
    ///
    /// The returned [`PgConn`] goes back to the pool when dropped, on every
    /// exit path. This method will wait up to the configured timeout for an
    /// available connection and does not retry.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection is available within the timeout
    /// period, the database rejects the connection, or the tenant
    /// `search_path` cannot be applied.
    #[tracing::instrument(
        skip(self),
        target = TRACING_TARGET_CONNECTION,
        fields(schema = %TenantContext::current())
    )]
    pub async fn get_connection(&self) -> PgResult<PgConn> {
        tracing::debug!(target: TRACING_TARGET_CONNECTION, "Acquiring connection from pool");

        let start = std::time::Instant::now();
        let conn = self.inner.pool.get().await.map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                error = %e,
                elapsed = ?start.elapsed(),
                "Failed to acquire connection from pool"
            );
            PgError::from(e)
        })?;

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(100) {
            tracing::warn!(
                target: TRACING_TARGET_CONNECTION,
                elapsed = ?elapsed,
                "Connection acquisition took longer than expected"
            );
        }

        tracing::debug!(target: TRACING_TARGET_CONNECTION, elapsed = ?elapsed, "Connection acquired successfully");
        Ok(PgConn::new(conn))
    }

    /// Runs `f` with a checked-out connection and returns it to the pool
    /// before resolving, whether `f` succeeds or fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use diesel_async::scoped_futures::ScopedFutureExt;
    ///
    /// let path = client
    ///     .with_connection(|conn| {
    ///         async move { current_search_path(conn).await }.scope_boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_connection<'a, T, F>(&self, f: F) -> PgResult<T>
    where
        F: for<'r> FnOnce(&'r mut PgConn) -> ScopedBoxFuture<'a, 'r, PgResult<T>> + Send + 'a,
        T: Send + 'a,
    {
        let mut conn = self.get_connection().await?;
        let result = f(&mut conn).await;
        drop(conn);
        result
    }

    /// Gets the current pool status and statistics.
    #[inline]
    pub fn pool_status(&self) -> PgPoolStatus {
        let status = self.inner.pool.status();
        PgPoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Gets the database configuration used by this client.
    #[inline]
    pub fn config(&self) -> &PgConfig {
        &self.inner.config
    }

    /// Closes the pool; idle connections are dropped and further checkouts fail.
    pub fn close(&self) {
        tracing::info!(target: TRACING_TARGET_CLIENT, "Closing connection pool");
        self.inner.pool.close();
    }
}

impl fmt::Debug for PgClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool_status = self.pool_status();
        f.debug_struct("PgClient")
            .field("database_url", &self.inner.config.database_url_masked())
            .field(
                "pool_max_connections",
                &self.inner.config.postgres_max_connections,
            )
            .field("pool_current_size", &pool_status.size)
            .field("pool_available", &pool_status.available)
            .field("pool_waiting", &pool_status.waiting)
            .field("tenant_routing", &self.inner.config.tenant_routing())
            .finish()
    }
}

/// A wrapper around a pooled database connection.
///
/// `PgConn` owns a connection obtained from the connection pool and derefs to
/// the underlying [`AsyncPgConnection`], already scoped to a tenant schema.
/// When dropped, the connection is automatically returned to the pool.
///
/// ```ignore
/// let mut conn = pg_client.get_connection().await?;
/// let path = current_search_path(&mut conn).await?;
/// ```
///
/// [`AsyncPgConnection`]: crate::PgConnection
#[derive(Deref, DerefMut)]
pub struct PgConn {
    #[deref]
    #[deref_mut]
    conn: PooledConnection,
}

impl PgConn {
    /// Creates a new connection wrapper from a pooled connection.
    pub fn new(conn: PooledConnection) -> Self {
        Self { conn }
    }

    /// Executes the given function within a database transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If the function returns `Err`, the transaction is rolled back.
    pub async fn transaction<'a, T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'r> FnOnce(&'r mut PooledConnection) -> ScopedBoxFuture<'a, 'r, Result<T, E>>
            + Send
            + 'a,
        T: Send + 'a,
        E: From<diesel::result::Error> + Send + 'a,
    {
        self.conn.transaction(f).await
    }
}

impl fmt::Debug for PgConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(max_size: usize, size: usize, available: usize, waiting: usize) -> PgPoolStatus {
        PgPoolStatus {
            max_size,
            size,
            available,
            waiting,
        }
    }

    #[test]
    fn test_utilization_of_empty_pool() {
        let status = status(0, 0, 0, 0);
        assert_eq!(status.in_use(), 0);
        assert_eq!(status.utilization(), 0.0);
        assert!(!status.is_under_pressure());
    }

    #[test]
    fn test_utilization_of_full_pool() {
        let status = status(4, 4, 0, 0);
        assert_eq!(status.in_use(), 4);
        assert_eq!(status.utilization(), 1.0);
        assert!(status.is_under_pressure());
    }

    #[test]
    fn test_idle_connections_are_not_in_use() {
        let status = status(10, 4, 3, 0);
        assert_eq!(status.in_use(), 1);
        assert_eq!(status.utilization(), 0.1);
        assert!(!status.is_under_pressure());
    }

    #[test]
    fn test_waiting_requests_mean_pressure() {
        let status = status(10, 1, 1, 2);
        assert_eq!(status.in_use(), 0);
        assert!(status.is_under_pressure());
    }
}
