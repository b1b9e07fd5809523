//! Schema provisioning and `search_path` management.
//!
//! Schema names only ever reach SQL as a bound parameter or, where PostgreSQL
//! cannot bind identifiers (`CREATE SCHEMA`), as a quoted [`TenantSchema`]
//! that has already passed the identifier allow-list.

use diesel::sql_types::{Bool, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{PgClient, PgResult, TRACING_TARGET_SCHEMA, TenantSchema};

#[derive(diesel::QueryableByName)]
struct SearchPathRow {
    #[diesel(sql_type = Text)]
    search_path: String,
}

#[derive(diesel::QueryableByName)]
struct SchemaExistsRow {
    #[diesel(sql_type = Bool)]
    schema_exists: bool,
}

/// Scopes the session's `search_path` to `schema`.
///
/// Equivalent to `SET search_path TO <schema>`, but the name is sent as a bound
/// parameter and quoted server-side with `quote_ident`. The setting lasts for
/// the lifetime of the session.
pub async fn apply_search_path(
    conn: &mut AsyncPgConnection,
    schema: &TenantSchema,
) -> PgResult<()> {
    diesel::sql_query("SELECT set_config('search_path', quote_ident($1), false)")
        .bind::<Text, _>(schema.as_str().to_owned())
        .execute(conn)
        .await?;

    tracing::debug!(
        target: TRACING_TARGET_SCHEMA,
        schema = %schema,
        "Applied search path"
    );

    Ok(())
}

/// Returns the session's current `search_path` setting.
///
/// The value is the server's rendering of the setting: a schema name that is
/// not lowercase, or that is a keyword, comes back double-quoted.
pub async fn current_search_path(conn: &mut AsyncPgConnection) -> PgResult<String> {
    let row: SearchPathRow =
        diesel::sql_query("SELECT current_setting('search_path') AS search_path")
            .get_result(conn)
            .await?;

    Ok(row.search_path)
}

/// Creates `schema` unless it already exists.
///
/// Runs outside of an explicit transaction, so the statement commits on its own.
pub async fn create_schema(conn: &mut AsyncPgConnection, schema: &TenantSchema) -> PgResult<()> {
    let statement = format!("CREATE SCHEMA IF NOT EXISTS {}", schema.quoted());
    diesel::sql_query(statement).execute(conn).await?;
    Ok(())
}

/// Returns whether `schema` exists in the current database.
pub async fn schema_exists(conn: &mut AsyncPgConnection, schema: &TenantSchema) -> PgResult<bool> {
    let row: SchemaExistsRow = diesel::sql_query(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1) AS schema_exists",
    )
    .bind::<Text, _>(schema.as_str().to_owned())
    .get_result(conn)
    .await?;

    Ok(row.schema_exists)
}

/// Extension trait providing schema administration for [`PgClient`].
///
/// Every method checks out its own pooled connection and returns it before
/// resolving.
pub trait PgSchemaExt {
    /// Provisions `schema` if it does not exist yet.
    ///
    /// Calling this repeatedly with the same schema is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired or the role lacks
    /// the `CREATE` privilege on the database.
    fn create_schema(&self, schema: &TenantSchema) -> impl Future<Output = PgResult<()>>;

    /// Returns whether `schema` exists.
    fn schema_exists(&self, schema: &TenantSchema) -> impl Future<Output = PgResult<bool>>;

    /// Returns the `search_path` a connection checked out by the current task
    /// resolves names against.
    fn search_path(&self) -> impl Future<Output = PgResult<String>>;
}

impl PgSchemaExt for PgClient {
    #[tracing::instrument(skip(self), target = TRACING_TARGET_SCHEMA, fields(schema = %schema))]
    async fn create_schema(&self, schema: &TenantSchema) -> PgResult<()> {
        let mut conn = self.get_connection().await?;

        create_schema(&mut conn, schema).await.inspect_err(|err| {
            tracing::error!(
                target: TRACING_TARGET_SCHEMA,
                error = %err,
                "Failed to create schema"
            );
        })?;

        tracing::info!(target: TRACING_TARGET_SCHEMA, "Schema is provisioned");
        Ok(())
    }

    async fn schema_exists(&self, schema: &TenantSchema) -> PgResult<bool> {
        let mut conn = self.get_connection().await?;
        schema_exists(&mut conn, schema).await
    }

    async fn search_path(&self) -> PgResult<String> {
        let mut conn = self.get_connection().await?;
        current_search_path(&mut conn).await
    }
}
