//! Command handlers.
//!
//! Each handler prints its result to stdout; diagnostics go through tracing.

use anyhow::Context;
use tenantdb_postgres::{PgClient, PgSchemaExt, TenantContext, TenantSchema, set_tenant_schema};

use crate::TRACING_TARGET_COMMAND;
use crate::config::Command;

/// Runs `command` against `client`.
pub async fn run(command: &Command, client: &PgClient) -> anyhow::Result<()> {
    tracing::debug!(target: TRACING_TARGET_COMMAND, ?command, "Running command");

    match command {
        Command::CreateSchema { name } => create_schema(client, name).await,
        Command::SearchPath { tenant } => search_path(client, tenant.as_deref()).await,
        Command::Ping => ping(client).await,
    }
}

async fn create_schema(client: &PgClient, name: &str) -> anyhow::Result<()> {
    let schema =
        TenantSchema::new(name).with_context(|| format!("invalid schema name {name:?}"))?;

    client
        .create_schema(&schema)
        .await
        .with_context(|| format!("failed to create schema {schema}"))?;

    println!("{schema}");
    Ok(())
}

async fn search_path(client: &PgClient, tenant: Option<&str>) -> anyhow::Result<()> {
    let path = TenantContext::scope(TenantSchema::default(), async {
        if let Some(tenant) = tenant {
            set_tenant_schema(tenant)?;
        }
        client.search_path().await
    })
    .await
    .context("failed to read search path")?;

    println!("{path}");
    Ok(())
}

async fn ping(client: &PgClient) -> anyhow::Result<()> {
    client.ping().await.context("database is unreachable")?;

    let status = client.pool_status();
    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        pool_size = status.size,
        pool_available = status.available,
        "Database is reachable"
    );

    println!("ok");
    Ok(())
}
