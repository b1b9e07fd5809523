//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── command: Command            # create-schema, search-path, ping
//! ├── postgres: PgConfig          # Target, pool settings, tenant routing
//! └── logging: LoggingConfig      # Log output format
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! tenantdb --postgres-host db.internal --postgres-port 6432 create-schema tenant_a
//!
//! # Or via environment variables
//! POSTGRES_HOST=db.internal POSTGRES_PORT=6432 tenantdb create-schema tenant_a
//! ```

mod logging;

use std::process;

use clap::{Parser, Subcommand};
pub use logging::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use tenantdb_postgres::PgConfig;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "tenantdb")]
#[command(about = "Provision and inspect PostgreSQL tenant schemas")]
#[command(version)]
pub struct Cli {
    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,

    /// Database target, pool, and tenant routing configuration.
    #[clap(flatten)]
    pub postgres: PgConfig,

    /// Log output configuration.
    #[clap(flatten)]
    pub logging: LoggingConfig,
}

/// Operations supported by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand, Serialize, Deserialize)]
pub enum Command {
    /// Creates a tenant schema unless it already exists.
    CreateSchema {
        /// Schema name, e.g. `tenant_a`.
        name: String,
    },

    /// Prints the search path a connection resolves table names against.
    SearchPath {
        /// Tenant to select before checking out the connection.
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Checks that the database accepts connections.
    Ping,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// This ensures .env files are loaded before clap parses arguments, so
    /// variables from .env act as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.postgres.validate()?;
        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            database_url = %self.postgres.database_url_masked(),
            postgres_max_connections = self.postgres.postgres_max_connections,
            postgres_connection_timeout_secs = ?self.postgres.postgres_connection_timeout_secs,
            postgres_recycle_timeout_secs = ?self.postgres.postgres_recycle_timeout_secs,
            tenant_routing = %self.postgres.tenant_routing(),
            "Database configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use tenantdb_postgres::TenantRouting;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_schema() {
        let cli = Cli::try_parse_from(["tenantdb", "create-schema", "tenant_a"]).unwrap();
        assert_eq!(
            cli.command,
            Command::CreateSchema {
                name: "tenant_a".to_string()
            }
        );
    }

    #[test]
    fn test_parse_search_path_with_tenant() {
        let cli = Cli::try_parse_from(["tenantdb", "search-path", "--tenant", "tenant_b"]).unwrap();
        assert_eq!(
            cli.command,
            Command::SearchPath {
                tenant: Some("tenant_b".to_string())
            }
        );
    }

    #[test]
    fn test_parse_postgres_overrides() {
        let cli = Cli::try_parse_from([
            "tenantdb",
            "--postgres-host",
            "db.internal",
            "--postgres-port",
            "6432",
            "--postgres-max-connections",
            "4",
            "--postgres-recycle-timeout-secs",
            "15",
            "--postgres-tenant-routing",
            "on-connect",
            "--log-format",
            "json",
            "ping",
        ])
        .unwrap();

        assert_eq!(cli.command, Command::Ping);
        assert_eq!(cli.postgres.target.host, "db.internal");
        assert_eq!(cli.postgres.target.port, 6432);
        assert_eq!(cli.postgres.postgres_max_connections, 4);
        assert_eq!(
            cli.postgres.recycle_timeout(),
            Some(std::time::Duration::from_secs(15))
        );
        assert_eq!(cli.postgres.tenant_routing(), TenantRouting::OnConnect);
        assert_eq!(cli.logging.log_format, LogFormat::Json);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_invalid_pool_size_fails_validation() {
        let cli =
            Cli::try_parse_from(["tenantdb", "--postgres-max-connections", "64", "ping"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
