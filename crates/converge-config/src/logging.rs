// converge-config/src/logging.rs
// ============================================================================
// Module: Logging Setup
// Description: Tracing subscriber initialisation from the logging section.
// Purpose: Install one process-wide fmt subscriber with an env filter.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` takes precedence over `logging.filter` when it parses. The
//! subscriber can only be installed once per process; a second call fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;
use crate::config::LoggingConfig;

// ============================================================================
// SECTION: Initialisation
// ============================================================================

/// Builds the env filter for `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the configured filter does not parse.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|err| ConfigError::Invalid(format!("logging.filter is invalid: {err}")))
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the filter does not parse or a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(config.target)
        .try_init()
        .map_err(|err| ConfigError::Invalid(format!("logging already initialized: {err}")))
}
