//! Structured logging initialization.
//!
//! Builds a `tracing-subscriber` from [`LoggingConfig`](crate::config::LoggingConfig):
//! console output with timestamps and module paths, optional JSON formatting, and
//! environment-based filtering (`RUST_LOG` overrides the configured level).

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from a logging configuration.
///
/// Returns an error if a global subscriber is already installed, so embedders
/// that bring their own subscriber can simply skip this call. With
/// `log_to_console` off, output is discarded entirely.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), config.log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (config.log_to_console, config.json_format) {
        (false, _) => builder.with_writer(std::io::sink).try_init(),
        (true, true) => builder.json().try_init(),
        (true, false) => builder.try_init(),
    };
    installed
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
