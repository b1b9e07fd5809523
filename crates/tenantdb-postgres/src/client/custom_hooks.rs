//! Includes all callbacks and hooks for [`diesel`] and [`deadpool`].
//!
//! The tenant routing lives here: [`setup_callback`] scopes every new physical
//! connection, and [`rescope_on_checkout`] scopes every reused one when the
//! pool runs with [`TenantRouting::OnCheckout`].
//!
//! [`TenantRouting::OnCheckout`]: crate::TenantRouting::OnCheckout

use std::time::Instant;

use deadpool::managed::{HookError, HookResult, Metrics};
use diesel::{ConnectionError, ConnectionResult};
use diesel_async::pooled_connection::{PoolError, PoolableConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use futures::FutureExt;
use futures::future::BoxFuture;

use super::pg_config::mask_url;
use super::schema_ext::apply_search_path;
use crate::{PgError, TRACING_TARGET_CONNECTION, TenantContext};

/// Custom setup procedure used to establish a new connection.
///
/// Runs once per physical connection, inside the task whose checkout caused
/// the pool to grow. The tenant selected by that task is read before the
/// connection is opened and applied as the session `search_path` before the
/// pool hands the connection out. If scoping fails, the connection is dropped
/// and the checkout fails with [`ConnectionError::CouldntSetupConfiguration`].
///
/// See [`ManagerConfig`] and [`SetupCallback`] for more details.
///
/// [`ManagerConfig`]: diesel_async::pooled_connection::ManagerConfig
/// [`SetupCallback`]: diesel_async::pooled_connection::SetupCallback
pub fn setup_callback(addr: &str) -> BoxFuture<'_, ConnectionResult<AsyncPgConnection>> {
    let start = Instant::now();
    let masked_addr = mask_url(addr);
    let schema = TenantContext::current();

    tracing::info!(
        target: TRACING_TARGET_CONNECTION,
        hook = "setup_callback",
        addr = %masked_addr,
        schema = %schema,
        "Establishing new database connection"
    );

    async move {
        let mut conn = AsyncPgConnection::establish(addr).await.inspect_err(|err| {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                hook = "setup_callback",
                addr = %masked_addr,
                elapsed_ms = start.elapsed().as_millis(),
                error = %err,
                "Failed to establish database connection"
            );
        })?;

        if let Err(err) = apply_search_path(&mut conn, &schema).await {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                hook = "setup_callback",
                addr = %masked_addr,
                schema = %schema,
                error = %err,
                "Failed to scope connection to tenant schema"
            );

            return Err(match err {
                PgError::Query(err) => ConnectionError::CouldntSetupConfiguration(err),
                PgError::Connection(err) => err,
                other => ConnectionError::BadConnection(other.to_string()),
            });
        }

        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            hook = "setup_callback",
            addr = %masked_addr,
            schema = %schema,
            elapsed_ms = start.elapsed().as_millis(),
            "Database connection established successfully"
        );

        Ok(conn)
    }
    .boxed()
}

/// Custom hook called after a new connection has been established.
///
/// See [`PoolBuilder`] for more details.
///
/// [`PoolBuilder`]: deadpool::managed::PoolBuilder
pub fn post_create(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    let is_broken = conn.is_broken();

    tracing::info!(
        target: TRACING_TARGET_CONNECTION,
        hook = "post_create",
        schema = %TenantContext::current(),
        is_broken = is_broken,
        created_at = ?metrics.created,
        recycle_count = metrics.recycle_count,
        "Tenant connection added to pool"
    );

    if is_broken {
        tracing::warn!(
            target: TRACING_TARGET_CONNECTION,
            hook = "post_create",
            "Connection is broken after creation"
        );
    }

    // Note: should never return an error.
    Ok(())
}

/// Custom hook called before a connection has been recycled.
///
/// See [`PoolBuilder`] for more details.
///
/// [`PoolBuilder`]: deadpool::managed::PoolBuilder
pub fn pre_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    let is_broken = conn.is_broken();

    tracing::debug!(
        target: TRACING_TARGET_CONNECTION,
        hook = "pre_recycle",
        requested_schema = %TenantContext::current(),
        is_broken = is_broken,
        created_at = ?metrics.created,
        last_recycled = ?metrics.recycled,
        recycle_count = metrics.recycle_count,
        "Preparing to recycle connection"
    );

    if is_broken {
        tracing::warn!(
            target: TRACING_TARGET_CONNECTION,
            hook = "pre_recycle",
            recycle_count = metrics.recycle_count,
            "Connection is broken before recycling"
        );
    }

    // Note: should never return an error.
    Ok(())
}

/// Custom hook called after a connection has been recycled.
///
/// Used with [`TenantRouting::OnConnect`], where reused connections keep the
/// schema they were opened with.
///
/// See [`PoolBuilder`] for more details.
///
/// [`PoolBuilder`]: deadpool::managed::PoolBuilder
/// [`TenantRouting::OnConnect`]: crate::TenantRouting::OnConnect
pub fn post_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    let is_broken = conn.is_broken();

    tracing::debug!(
        target: TRACING_TARGET_CONNECTION,
        hook = "post_recycle",
        requested_schema = %TenantContext::current(),
        is_broken = is_broken,
        created_at = ?metrics.created,
        last_recycled = ?metrics.recycled,
        recycle_count = metrics.recycle_count,
        "Connection reused without re-scoping"
    );

    if is_broken {
        tracing::error!(
            target: TRACING_TARGET_CONNECTION,
            hook = "post_recycle",
            recycle_count = metrics.recycle_count,
            "Connection is broken after recycling, should be removed from pool"
        );
    }

    // Note: should never return an error.
    Ok(())
}

/// Custom hook called after a connection has been recycled, re-applying the
/// tenant `search_path` of the task checking it out.
///
/// Used with [`TenantRouting::OnCheckout`]. On failure deadpool discards the
/// connection and tries the next idle one, or opens a new one through
/// [`setup_callback`].
///
/// See [`PoolBuilder`] for more details.
///
/// [`PoolBuilder`]: deadpool::managed::PoolBuilder
/// [`TenantRouting::OnCheckout`]: crate::TenantRouting::OnCheckout
pub fn rescope_on_checkout<'a>(
    conn: &'a mut AsyncPgConnection,
    metrics: &'a Metrics,
) -> BoxFuture<'a, HookResult<PoolError>> {
    let schema = TenantContext::current();

    tracing::debug!(
        target: TRACING_TARGET_CONNECTION,
        hook = "rescope_on_checkout",
        schema = %schema,
        created_at = ?metrics.created,
        recycle_count = metrics.recycle_count,
        "Re-scoping recycled connection"
    );

    async move {
        match apply_search_path(conn, &schema).await {
            Ok(()) => Ok(()),
            Err(PgError::Query(err)) => {
                tracing::warn!(
                    target: TRACING_TARGET_CONNECTION,
                    hook = "rescope_on_checkout",
                    schema = %schema,
                    error = %err,
                    "Failed to re-scope recycled connection, discarding it"
                );
                Err(HookError::Backend(PoolError::QueryError(err)))
            }
            Err(err) => Err(HookError::Message(err.to_string().into())),
        }
    }
    .boxed()
}
