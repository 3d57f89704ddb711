//! Config defaults and validation tests for converge-config.
// converge-config/tests/config_validation.rs
// =============================================================================
// Module: Config Defaults and Validation Tests
// Description: Validate defaults, limits, and code type list invariants.
// Purpose: Ensure the minimal config is valid and bad values fail closed.
// =============================================================================

use converge_config::ConvergeConfig;
use converge_core::PluginRegistry;
use converge_core::ResolverConfig;

mod common;

use common::TestResult;
use common::assert_invalid;
use common::minimal_config;

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn default_config_validates() -> TestResult {
    let config = minimal_config().map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config != ConvergeConfig::default() {
        return Err("empty toml should equal the default config".to_string());
    }
    Ok(())
}

#[test]
fn default_resolver_settings_match_core_defaults() -> TestResult {
    let config = minimal_config().map_err(|err| err.to_string())?;
    if config.resolver_config() != ResolverConfig::default() {
        return Err("resolver defaults drifted from core".to_string());
    }
    Ok(())
}

#[test]
fn default_registry_serves_noop() -> TestResult {
    let config = minimal_config().map_err(|err| err.to_string())?;
    let registry = config.plugin_registry().map_err(|err| err.to_string())?;
    registry.get_deploy_plugin("noop").map_err(|err| err.to_string())?;
    if registry.post_process_plugins().len() != 1 {
        return Err("noop post-process should be registered by default".to_string());
    }
    Ok(())
}

#[test]
fn sections_round_trip_into_core_types() -> TestResult {
    let config = ConvergeConfig::from_toml(
        r#"
[logging]
filter = "warn,converge_core=debug"
ansi = true

[resolver]
max_resolution_depth = 8
log_calculated_params = false

[plugins]
allowlist = ["helm", "noop"]
denylist = ["istio"]
noop_code_types = ["noop", "helm"]
noop_post_process = false
"#,
    )
    .map_err(|err| err.to_string())?;
    let resolver = config.resolver_config();
    if resolver.max_resolution_depth != 8 || resolver.log_calculated_params {
        return Err(format!("resolver settings not applied: {}", resolver.max_resolution_depth));
    }
    let registry = config.plugin_registry().map_err(|err| err.to_string())?;
    registry.get_deploy_plugin("helm").map_err(|err| err.to_string())?;
    if registry.get_deploy_plugin("istio").is_ok() {
        return Err("denylisted code type should be blocked".to_string());
    }
    if !registry.post_process_plugins().is_empty() {
        return Err("post-process should be disabled".to_string());
    }
    Ok(())
}

// ============================================================================
// SECTION: Invalid Values
// ============================================================================

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    assert_invalid(ConvergeConfig::from_toml("[resolver]\nmax_depth = 3\n"), "parse error")
}

#[test]
fn empty_filter_is_rejected() -> TestResult {
    assert_invalid(
        ConvergeConfig::from_toml("[logging]\nfilter = \"  \"\n"),
        "logging.filter must be non-empty",
    )
}

#[test]
fn unparseable_filter_is_rejected() -> TestResult {
    assert_invalid(
        ConvergeConfig::from_toml("[logging]\nfilter = \"converge=loud\"\n"),
        "logging.filter is invalid",
    )
}

#[test]
fn zero_expression_limit_is_rejected() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.resolver.max_expression_bytes = 0;
    assert_invalid(config.validate(), "resolver.max_expression_bytes must be greater than zero")
}

#[test]
fn template_limit_at_max_is_accepted() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.resolver.max_template_bytes = 16 * 1024 * 1024;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn template_limit_over_max_is_rejected() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.resolver.max_template_bytes = 16 * 1024 * 1024 + 1;
    assert_invalid(config.validate(), "resolver.max_template_bytes exceeds")
}

#[test]
fn depth_bounds_are_enforced() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.resolver.max_resolution_depth = 0;
    assert_invalid(config.validate(), "max_resolution_depth must be greater than zero")?;
    config.resolver.max_resolution_depth = 1024;
    config.validate().map_err(|err| err.to_string())?;
    config.resolver.max_resolution_depth = 1025;
    assert_invalid(config.validate(), "max_resolution_depth exceeds 1024")
}

#[test]
fn duplicate_code_types_are_rejected() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.plugins.noop_code_types = vec!["noop".to_string(), "noop".to_string()];
    assert_invalid(config.validate(), "plugins.noop_code_types contains duplicate code type")
}

#[test]
fn empty_code_type_is_rejected() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.plugins.denylist = vec![String::new()];
    assert_invalid(config.validate(), "plugins.denylist entries must be non-empty")
}

#[test]
fn code_type_in_both_lists_is_rejected() -> TestResult {
    let mut config = minimal_config().map_err(|err| err.to_string())?;
    config.plugins.allowlist = Some(vec!["helm".to_string()]);
    config.plugins.denylist = vec!["helm".to_string()];
    assert_invalid(config.validate(), "code type `helm` is both allowlisted and denylisted")
}
