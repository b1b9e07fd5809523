#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Tracing target constants for consistent logging.

/// Tracing target for client-related operations.
///
/// Use this target for logging client initialization, configuration, and lifecycle events.
pub const TRACING_TARGET_CLIENT: &str = "tenantdb_postgres::client";

/// Tracing target for database connection operations.
///
/// Use this target for logging connection establishment, pool management, and connection errors.
pub const TRACING_TARGET_CONNECTION: &str = "tenantdb_postgres::connection";

/// Tracing target for tenant selection.
pub const TRACING_TARGET_TENANT: &str = "tenantdb_postgres::tenant";

/// Tracing target for schema provisioning and `search_path` changes.
pub const TRACING_TARGET_SCHEMA: &str = "tenantdb_postgres::schema";

mod client;
pub mod prelude;
pub mod tenant;

use std::borrow::Cow;

use deadpool::managed::TimeoutType;
use diesel::ConnectionError;
use diesel::result::Error;
pub use diesel_async::AsyncPgConnection as PgConnection;
use error::ErrorHint;

pub use crate::client::{
    ConnectionPool, PgClient, PgConfig, PgConn, PgPoolStatus, PgSchemaExt, PgTarget,
    PooledConnection, TenantRouting, apply_search_path, create_schema, current_search_path,
    schema_exists,
};
pub use crate::tenant::{
    SchemaNameError, TenantContext, TenantSchema, current_tenant_schema, set_tenant_schema,
};

pub mod error {
    //! Error types and utilities for database operations.
    //!
    //! See [`PgError`] for the main error type used throughout this crate.
    //!
    //! [`PgError`]: crate::PgError

    use std::borrow::Cow;

    pub use deadpool::managed::TimeoutType;
    pub use diesel::result::{ConnectionError as DieselConnectionError, Error as DieselError};
    pub use diesel_async::pooled_connection::PoolError as DieselPoolError;
    pub use diesel_async::pooled_connection::deadpool::PoolError as DeadpoolError;

    pub use crate::tenant::SchemaNameError;

    /// Provides contextual hints for error types to aid in debugging and user messaging.
    ///
    /// This trait allows error types to provide additional context about what went wrong
    /// and potential remediation steps.
    pub trait ErrorHint {
        /// Returns an additional hint for an error type.
        ///
        /// The hint should provide actionable information about the error context
        /// or potential solutions.
        fn hint(&self) -> Cow<'static, str>;
    }

    impl ErrorHint for TimeoutType {
        fn hint(&self) -> Cow<'static, str> {
            match self {
                TimeoutType::Wait => Cow::Borrowed(
                    "Connection pool is exhausted, consider increasing pool size or optimizing query performance",
                ),
                TimeoutType::Create => Cow::Borrowed(
                    "Unable to establish new database connection, check connection string and database availability",
                ),
                TimeoutType::Recycle => Cow::Borrowed(
                    "Failed to recycle database connection, connection may be in invalid state",
                ),
            }
        }
    }
}

/// Error type for all tenant-aware PostgreSQL operations.
///
/// Errors from the pool and the driver are carried unchanged; nothing in this
/// crate retries.
#[derive(Debug, thiserror::Error)]
#[must_use = "database errors should be handled appropriately"]
pub enum PgError {
    /// Configuration error.
    ///
    /// This includes invalid configuration parameters, missing required settings,
    /// or malformed environment variables.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema identifier failed validation.
    ///
    /// Raised before any SQL is built, so the rejected name never reaches the
    /// database.
    #[error("Invalid schema name: {0}")]
    InvalidSchema(#[from] tenant::SchemaNameError),

    /// A tenant was selected outside of a [`TenantContext::scope`].
    #[error("No tenant scope is active for the current task")]
    TenantScope,

    /// Database operation timed out.
    ///
    /// This can occur during connection creation, waiting for available connections,
    /// or connection recycling operations.
    #[error("Database operation timed out")]
    Timeout(TimeoutType),

    /// Failed to establish or maintain a database connection.
    ///
    /// This includes authentication failures, network issues, invalid
    /// connection parameters, and failures to scope a new connection to its
    /// tenant schema.
    #[error("Database connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Database query execution failed.
    ///
    /// This includes SQL syntax errors, missing privileges, and other
    /// query-related failures.
    #[error("Database query error: {0}")]
    Query(#[from] Error),

    /// Unexpected error occurred.
    ///
    /// This can occur when an error is encountered that is not covered by the
    /// other error types.
    #[error("Unexpected error: {0}")]
    Unexpected(Cow<'static, str>),
}

impl PgError {
    /// Returns whether this error indicates a transient failure that might succeed on retry.
    ///
    /// Transient errors include timeouts and certain connection issues that may
    /// be resolved by retrying the operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PgError::Timeout(_) | PgError::Connection(ConnectionError::BadConnection(_))
        )
    }

    /// Returns whether this error indicates a permanent failure that won't succeed on retry.
    ///
    /// Permanent errors include authentication failures, invalid schema names,
    /// and syntax or privilege errors.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl ErrorHint for PgError {
    fn hint(&self) -> Cow<'static, str> {
        match self {
            PgError::Config(_) => Cow::Borrowed(
                "Check the POSTGRES_* environment variables and pool settings",
            ),
            PgError::InvalidSchema(err) => err.hint(),
            PgError::TenantScope => Cow::Borrowed(
                "Wrap the unit of work in TenantContext::scope before selecting a tenant",
            ),
            PgError::Timeout(timeout) => timeout.hint(),
            PgError::Connection(ConnectionError::CouldntSetupConfiguration(_)) => Cow::Borrowed(
                "The connection was opened but its tenant search_path could not be applied",
            ),
            PgError::Connection(_) => Cow::Borrowed(
                "Check that the database is reachable and the credentials are accepted",
            ),
            PgError::Query(_) => Cow::Borrowed(
                "Check the statement and that the role holds the required privileges",
            ),
            PgError::Unexpected(_) => Cow::Borrowed("Unexpected failure, see the logs for details"),
        }
    }
}

impl From<error::DeadpoolError> for PgError {
    fn from(value: error::DeadpoolError) -> Self {
        use error::{DeadpoolError, DieselPoolError};

        match value {
            DeadpoolError::Timeout(timeout) => Self::Timeout(timeout),
            DeadpoolError::Backend(DieselPoolError::QueryError(error)) => Self::Query(error),
            DeadpoolError::Backend(DieselPoolError::ConnectionError(error)) => {
                Self::Connection(error)
            }
            DeadpoolError::PostCreateHook(err) => {
                // This should not happen with our current hooks, but handle gracefully:
                tracing::warn!("Unexpected post-create hook error: {}", err);
                Self::Unexpected(err.to_string().into())
            }
            DeadpoolError::NoRuntimeSpecified => {
                // This should not happen as we specify tokio runtime, but handle gracefully:
                tracing::error!("No tokio runtime specified for connection pool");
                Self::Unexpected("No runtime specified".into())
            }
            DeadpoolError::Closed => {
                // Pool was closed, treat as connection error:
                Self::Connection(ConnectionError::InvalidConnectionUrl(
                    "Connection pool is closed".into(),
                ))
            }
        }
    }
}

/// Specialized [`Result`] type for database operations.
///
/// This is a convenience alias that uses [`PgError`] as the error type,
/// making database operation signatures cleaner and more consistent.
pub type PgResult<T, E = PgError> = Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_converts() {
        let err: PgError = TenantSchema::new("a;b").unwrap_err().into();
        assert!(matches!(err, PgError::InvalidSchema(_)));
        assert!(err.is_permanent());
        assert!(err.to_string().starts_with("Invalid schema name"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(PgError::Timeout(TimeoutType::Wait).is_transient());
        assert!(PgError::Connection(ConnectionError::BadConnection("reset".into())).is_transient());
        assert!(PgError::TenantScope.is_permanent());
        assert!(PgError::Config("bad".into()).is_permanent());
    }

    #[test]
    fn test_setup_failure_hint() {
        let err = PgError::Connection(ConnectionError::CouldntSetupConfiguration(
            Error::NotFound,
        ));
        assert!(err.hint().contains("search_path"));
        assert!(
            PgError::Timeout(TimeoutType::Wait)
                .hint()
                .contains("pool is exhausted")
        );
    }

    #[test]
    fn test_closed_pool_maps_to_connection_error() {
        let err = PgError::from(error::DeadpoolError::Closed);
        assert!(matches!(
            err,
            PgError::Connection(ConnectionError::InvalidConnectionUrl(_))
        ));
    }
}
