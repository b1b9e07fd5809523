//! Telemetry and tracing configuration.

mod tracing;

use anyhow::Context;

use crate::config::LoggingConfig;

/// Initializes the tracing subscriber for the configured output format.
///
/// # Errors
///
/// Returns an error if the tracing subscriber fails to initialize.
pub(crate) fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    tracing::init_tracing(config.log_format).context("Failed to initialize tracing")
}
