#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;
mod telemetry;

use std::process;

use anyhow::Context;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "tenantdb_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "tenantdb_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "tenantdb_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "tenantdb_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::debug!(
            target: TRACING_TARGET_SHUTDOWN,
            "command completed successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        let message = format!("{error:#}");
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %message,
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(&cli.logging)?;
    cli.log();
    cli.validate().context("invalid database configuration")?;

    let client = cli
        .postgres
        .clone()
        .build()
        .context("failed to create database client")?;

    let result = command::run(&cli.command, &client).await;
    client.close();
    result
}
