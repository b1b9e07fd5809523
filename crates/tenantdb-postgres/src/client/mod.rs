//! Tenant-aware PostgreSQL client with connection pooling.
//!
//! This module connects to PostgreSQL, manages the connection pool, and wires
//! the hooks that scope each connection's `search_path` to the current tenant.
//! Schema provisioning lives in the [`PgSchemaExt`] extension trait.

pub(crate) mod custom_hooks;
mod pg_client;
mod pg_config;
mod schema_ext;

use deadpool::managed::{Object, Pool};
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
pub use pg_client::{PgClient, PgConn, PgPoolStatus};
pub use pg_config::{PgConfig, PgTarget, TenantRouting};
pub use schema_ext::{
    PgSchemaExt, apply_search_path, create_schema, current_search_path, schema_exists,
};

/// Type alias for the connection pool used throughout the application.
pub type ConnectionPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Type alias for a connection object from the pool.
pub type PooledConnection = Object<AsyncDieselConnectionManager<AsyncPgConnection>>;
