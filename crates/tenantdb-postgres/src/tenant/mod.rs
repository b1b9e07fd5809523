//! Tenant selection and schema identifiers.
//!
//! Tenants are isolated into their own PostgreSQL schemas. This module holds
//! the validated identifier type and the task-local context the connection
//! hooks consult when they scope a connection's `search_path`.

mod context;
mod schema_name;

pub use context::{TenantContext, current_tenant_schema, set_tenant_schema};
pub use schema_name::{MAX_SCHEMA_NAME_LEN, SchemaNameError, TenantSchema};
