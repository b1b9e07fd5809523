//! Task-local tenant selection.
//!
//! Every request runs inside a [`TenantContext::scope`], which gives the task
//! its own tenant cell. Code further down the call chain selects the tenant
//! with [`set_tenant_schema`], and the connection hooks read it back with
//! [`current_tenant_schema`] when they scope a connection's `search_path`.
//!
//! Cells are never shared between tasks, so concurrent requests against the
//! same pool cannot observe each other's tenant.

use std::cell::RefCell;

use crate::{PgError, PgResult, TRACING_TARGET_TENANT, TenantSchema};

tokio::task_local! {
    static CURRENT_TENANT: RefCell<TenantSchema>;
}

/// Accessors for the tenant selected by the current task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContext;

impl TenantContext {
    /// Runs `future` with its own tenant cell initialised to `schema`.
    ///
    /// Values set inside the scope are discarded when it ends, and an enclosing
    /// scope sees its own value again.
    pub async fn scope<F>(schema: TenantSchema, future: F) -> F::Output
    where
        F: Future,
    {
        tracing::trace!(
            target: TRACING_TARGET_TENANT,
            schema = %schema,
            "Entering tenant scope"
        );

        CURRENT_TENANT.scope(RefCell::new(schema), future).await
    }

    /// Runs the synchronous closure `f` with its own tenant cell.
    pub fn sync_scope<F, R>(schema: TenantSchema, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_TENANT.sync_scope(RefCell::new(schema), f)
    }

    /// Returns the tenant for the current task.
    ///
    /// Falls back to [`TenantSchema::PUBLIC`] outside of any scope.
    pub fn current() -> TenantSchema {
        CURRENT_TENANT
            .try_with(|cell| cell.borrow().clone())
            .unwrap_or_default()
    }

    /// Replaces the tenant for the current scope.
    ///
    /// # Errors
    ///
    /// Returns [`PgError::TenantScope`] when called outside of a scope.
    pub fn set(schema: TenantSchema) -> PgResult<()> {
        CURRENT_TENANT
            .try_with(|cell| {
                let previous = cell.replace(schema);
                tracing::debug!(
                    target: TRACING_TARGET_TENANT,
                    previous = %previous,
                    current = %cell.borrow(),
                    "Tenant schema selected"
                );
            })
            .map_err(|_| PgError::TenantScope)
    }

    /// Returns whether the caller runs inside a tenant scope.
    pub fn is_scoped() -> bool {
        CURRENT_TENANT.try_with(|_| ()).is_ok()
    }
}

/// Validates `name` and selects it as the tenant for the current scope.
///
/// The identifier is checked before it is stored, so a malformed or hostile
/// name never reaches a `search_path` statement. On failure the previously
/// selected tenant stays in place.
///
/// # Errors
///
/// - [`PgError::InvalidSchema`] if `name` is not an allowed schema identifier
/// - [`PgError::TenantScope`] if called outside of [`TenantContext::scope`]
pub fn set_tenant_schema(name: impl AsRef<str>) -> PgResult<TenantSchema> {
    let schema = TenantSchema::new(name).inspect_err(|err| {
        tracing::warn!(
            target: TRACING_TARGET_TENANT,
            error = %err,
            "Rejected tenant schema name"
        );
    })?;

    TenantContext::set(schema.clone())?;
    Ok(schema)
}

/// Returns the tenant selected for the current task, or `public`.
#[inline]
pub fn current_tenant_schema() -> TenantSchema {
    TenantContext::current()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Barrier;

    use super::*;

    fn schema(name: &str) -> TenantSchema {
        TenantSchema::new(name).unwrap()
    }

    #[test]
    fn test_default_outside_scope() {
        assert!(!TenantContext::is_scoped());
        assert_eq!(current_tenant_schema(), TenantSchema::PUBLIC);
    }

    #[test]
    fn test_set_outside_scope_fails() {
        let result = set_tenant_schema("tenant_a");
        assert!(matches!(result, Err(PgError::TenantScope)));
        assert_eq!(current_tenant_schema(), TenantSchema::PUBLIC);
    }

    #[tokio::test]
    async fn test_scope_starts_with_given_schema() {
        let observed =
            TenantContext::scope(schema("tenant_a"), async { current_tenant_schema() }).await;
        assert_eq!(observed, schema("tenant_a"));
    }

    #[tokio::test]
    async fn test_set_within_scope() {
        TenantContext::scope(TenantSchema::default(), async {
            assert!(TenantContext::is_scoped());
            assert!(current_tenant_schema().is_public());

            let selected = set_tenant_schema("tenant_b").unwrap();
            assert_eq!(selected, schema("tenant_b"));
            assert_eq!(current_tenant_schema(), schema("tenant_b"));
        })
        .await;

        assert!(current_tenant_schema().is_public());
    }

    #[tokio::test]
    async fn test_rejected_name_keeps_previous() {
        TenantContext::scope(schema("tenant_a"), async {
            let result = set_tenant_schema("tenant_a; DROP SCHEMA public CASCADE");
            assert!(matches!(result, Err(PgError::InvalidSchema(_))));
            assert_eq!(current_tenant_schema(), schema("tenant_a"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer() {
        TenantContext::scope(schema("outer"), async {
            TenantContext::scope(schema("inner"), async {
                set_tenant_schema("inner_changed").unwrap();
                assert_eq!(current_tenant_schema(), schema("inner_changed"));
            })
            .await;

            assert_eq!(current_tenant_schema(), schema("outer"));
        })
        .await;
    }

    #[test]
    fn test_sync_scope() {
        let observed = TenantContext::sync_scope(schema("tenant_sync"), || {
            TenantContext::set(schema("tenant_sync_2")).unwrap();
            current_tenant_schema()
        });

        assert_eq!(observed, schema("tenant_sync_2"));
        assert!(!TenantContext::is_scoped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_scopes_are_isolated() {
        let barrier = Arc::new(Barrier::new(2));

        let spawn_tenant = |name: &'static str| {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(TenantContext::scope(TenantSchema::default(), async move {
                set_tenant_schema(name).unwrap();
                // Both tasks have set their tenant before either reads it back.
                barrier.wait().await;
                tokio::task::yield_now().await;
                current_tenant_schema()
            }))
        };

        let first = spawn_tenant("tenant_one");
        let second = spawn_tenant("tenant_two");

        assert_eq!(first.await.unwrap(), schema("tenant_one"));
        assert_eq!(second.await.unwrap(), schema("tenant_two"));
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_scope() {
        TenantContext::scope(schema("tenant_a"), async {
            let inner = tokio::spawn(async { current_tenant_schema() })
                .await
                .unwrap();
            assert!(inner.is_public());
        })
        .await;
    }
}
