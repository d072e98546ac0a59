//! Structured logging for the CLI.
//!
//! Logs go to stderr as JSON so stdout carries only command output. Keys,
//! passwords and plaintext never appear in log fields.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_telemetry(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(())
}
