//! Logging setup

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{CallError, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives are honoured on top of the configured level.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = fmt::Subscriber::builder().with_env_filter(filter);

    let installed = if config.json {
        subscriber.json().with_writer(std::io::stdout).try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| CallError::config(format!("Failed to install logger: {}", e)))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| CallError::config(format!("Invalid log level: {}", level)))
}
