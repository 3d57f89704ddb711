// converge-config/src/config.rs
// ============================================================================
// Module: Converge Configuration
// Description: Configuration loading and validation for the policy engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: converge-core, converge-plugins, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section defaults, and unknown keys are rejected. Invalid values fail
//! closed instead of being clamped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use converge_core::ResolverConfig;
use converge_plugins::NOOP_CODE_TYPE;
use converge_plugins::NoopDeployPlugin;
use converge_plugins::NoopPostProcessPlugin;
use converge_plugins::PluginAccessPolicy;
use converge_plugins::PluginRegistryImpl;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "converge.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "CONVERGE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted expression or template limit in bytes.
pub(crate) const MAX_SOURCE_LIMIT_BYTES: usize = 16 * 1024 * 1024;
/// Maximum accepted resolution depth.
pub(crate) const MAX_RESOLUTION_DEPTH: usize = 1024;
/// Maximum number of entries in one code type list.
pub(crate) const MAX_CODE_TYPES: usize = 256;
/// Default tracing filter directive.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Policy engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvergeConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Resolver limits.
    pub resolver: ResolverSettings,
    /// Plugin registry configuration.
    pub plugins: PluginsConfig,
}

impl ConvergeConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// the explicit path, then `CONVERGE_CONFIG`, then `converge.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.resolver.validate()?;
        self.plugins.validate()
    }

    /// Returns the core resolver configuration.
    #[must_use]
    pub const fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_expression_bytes: self.resolver.max_expression_bytes,
            max_template_bytes: self.resolver.max_template_bytes,
            max_resolution_depth: self.resolver.max_resolution_depth,
            log_calculated_params: self.resolver.log_calculated_params,
        }
    }

    /// Builds the plugin registry described by the `[plugins]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the built-in plugins cannot be registered.
    pub fn plugin_registry(&self) -> Result<PluginRegistryImpl, ConfigError> {
        let mut registry = PluginRegistryImpl::new(self.plugins.access_policy());
        if !self.plugins.noop_code_types.is_empty() {
            let plugin = NoopDeployPlugin::new(self.plugins.noop_code_types.iter().cloned());
            registry
                .register_deploy_plugin(plugin)
                .map_err(|err| ConfigError::Invalid(format!("plugins.noop_code_types: {err}")))?;
        }
        if self.plugins.noop_post_process {
            registry.register_post_process_plugin(NoopPostProcessPlugin);
        }
        Ok(registry)
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Logging configuration for the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Tracing env-filter directive, such as `info,converge_core=debug`.
    pub filter: String,
    /// Emit ANSI colour codes.
    pub ansi: bool,
    /// Include the event target in each line.
    pub target: bool,
}

impl LoggingConfig {
    /// Validates the filter directive.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        EnvFilter::try_new(&self.filter)
            .map_err(|err| ConfigError::Invalid(format!("logging.filter is invalid: {err}")))?;
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            ansi: false,
            target: true,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolver limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// Maximum accepted expression size in bytes.
    pub max_expression_bytes: usize,
    /// Maximum accepted template size in bytes.
    pub max_template_bytes: usize,
    /// Maximum service nesting depth.
    pub max_resolution_depth: usize,
    /// Record calculated params as debug events.
    pub log_calculated_params: bool,
}

impl ResolverSettings {
    /// Validates resolver limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_byte_limit("resolver.max_expression_bytes", self.max_expression_bytes)?;
        validate_byte_limit("resolver.max_template_bytes", self.max_template_bytes)?;
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::Invalid(
                "resolver.max_resolution_depth must be greater than zero".to_string(),
            ));
        }
        if self.max_resolution_depth > MAX_RESOLUTION_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "resolver.max_resolution_depth exceeds {MAX_RESOLUTION_DEPTH}"
            )));
        }
        Ok(())
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            max_expression_bytes: defaults.max_expression_bytes,
            max_template_bytes: defaults.max_template_bytes,
            max_resolution_depth: defaults.max_resolution_depth,
            log_calculated_params: defaults.log_calculated_params,
        }
    }
}

// ============================================================================
// SECTION: Plugins
// ============================================================================

/// Plugin registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginsConfig {
    /// Optional allowlist of code types.
    pub allowlist: Option<Vec<String>>,
    /// Code types that are never deployed.
    pub denylist: Vec<String>,
    /// Code types served by the built-in no-op deploy plugin.
    pub noop_code_types: Vec<String>,
    /// Register the built-in no-op post-process plugin.
    pub noop_post_process: bool,
}

impl PluginsConfig {
    /// Returns the registry access policy.
    #[must_use]
    pub fn access_policy(&self) -> PluginAccessPolicy {
        PluginAccessPolicy {
            allowlist: self.allowlist.as_ref().map(|list| list.iter().cloned().collect()),
            denylist: self.denylist.iter().cloned().collect(),
        }
    }

    /// Validates code type lists.
    fn validate(&self) -> Result<(), ConfigError> {
        let denied = validate_code_types("plugins.denylist", &self.denylist)?;
        validate_code_types("plugins.noop_code_types", &self.noop_code_types)?;
        if let Some(allowlist) = &self.allowlist {
            let allowed = validate_code_types("plugins.allowlist", allowlist)?;
            if let Some(code_type) = allowed.intersection(&denied).next() {
                return Err(ConfigError::Invalid(format!(
                    "code type `{code_type}` is both allowlisted and denylisted"
                )));
            }
        }
        Ok(())
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            allowlist: None,
            denylist: Vec::new(),
            noop_code_types: vec![NOOP_CODE_TYPE.to_string()],
            noop_post_process: true,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit argument, the environment, or
/// the default filename.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a byte limit is non-zero and bounded.
fn validate_byte_limit(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    if value > MAX_SOURCE_LIMIT_BYTES {
        return Err(ConfigError::Invalid(format!("{field} exceeds {MAX_SOURCE_LIMIT_BYTES}")));
    }
    Ok(())
}

/// Validates a code type list and returns it as a set.
fn validate_code_types<'a>(
    field: &str,
    values: &'a [String],
) -> Result<BTreeSet<&'a str>, ConfigError> {
    if values.len() > MAX_CODE_TYPES {
        return Err(ConfigError::Invalid(format!("too many {field} entries")));
    }
    let mut seen = BTreeSet::new();
    for value in values {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
        }
        if !seen.insert(value.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "{field} contains duplicate code type `{value}`"
            )));
        }
    }
    Ok(seen)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
