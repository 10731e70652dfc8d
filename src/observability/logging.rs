//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem. The
//! library only emits events; installing a subscriber is left to the host
//! process, which can use [`init_logging`] when it has no setup of its own.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::{Error, Result};

/// Logging output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Install a global fmt subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| Error::config(format!("Failed to install log subscriber: {}", e)))
}

/// Create a tracing span for a broker operation
///
/// ```rust,ignore
/// let span = broker_span!("get_secrets", "secret/data/my-service");
/// ```
#[macro_export]
macro_rules! broker_span {
    ($operation:expr, $secret_path:expr) => {
        tracing::info_span!(
            "broker_operation",
            operation = %$operation,
            secret_path = %$secret_path,
            token_source = tracing::field::Empty
        )
    };
}
