//! Prelude module for tenantdb-postgres.
//!
//! This module re-exports the most commonly used types and traits from tenantdb-postgres,
//! making it easy to import everything you need with a single `use` statement.
//!
//! # Example
//!
//! ```rust,no_run
//! use tenantdb_postgres::prelude::*;
//!
//! # async fn example() -> PgResult<()> {
//! let client = PgConfig::from_env()?.build()?;
//!
//! TenantContext::scope(TenantSchema::default(), async {
//!     set_tenant_schema("tenant_a")?;
//!     let mut conn = client.get_connection().await?;
//!     assert_eq!(current_search_path(&mut conn).await?, "tenant_a");
//!     Ok::<_, PgError>(())
//! })
//! .await
//! # }
//! ```

// Common query traits
pub use diesel::prelude::*;
pub use diesel_async::RunQueryDsl;

// Connection type
pub use crate::PgConnection;
pub use crate::client::{
    ConnectionPool, PgClient, PgConfig, PgConn, PgPoolStatus, PgSchemaExt, PgTarget,
    TenantRouting, current_search_path,
};
// Tenant selection
pub use crate::tenant::{TenantContext, TenantSchema, current_tenant_schema, set_tenant_schema};
// Error types
pub use crate::{PgError, PgResult};
