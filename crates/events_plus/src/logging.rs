//! Logging setup built on `tracing-subscriber`.

use crate::config::LoggingSettings;
use crate::error::EventError;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level` when set. JSON output is used when
/// either `json_format` or `config.json_format` asks for it.
///
/// # Errors
///
/// [`EventError::Config`] when a global subscriber is already installed.
pub fn setup_logging(config: &LoggingSettings, json_format: bool) -> Result<(), EventError> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
    };
    installed.map_err(|e| EventError::Config(format!("logging already initialized: {}", e)))?;

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}
