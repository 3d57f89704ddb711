// converge-plugins/src/registry.rs
// ============================================================================
// Module: Plugin Registry
// Description: Registry for deploy and post-process plugins.
// Purpose: Route deploy calls by code type with allowlist and denylist checks.
// Dependencies: converge-core
// ============================================================================

//! ## Overview
//! The plugin registry resolves deploy plugins by code type and enforces
//! allowlist and denylist policies. It implements the core
//! [`converge_core::PluginRegistry`] interface consumed by actions. Each code
//! type is served by at most one deploy plugin; a second claim is rejected at
//! registration time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use converge_core::DeployPlugin;
use converge_core::PluginError;
use converge_core::PluginRegistry;
use converge_core::PostProcessPlugin;

// ============================================================================
// SECTION: Access Policy
// ============================================================================

/// Access policy controlling which code types may be deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginAccessPolicy {
    /// Optional allowlist of code types.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist of code types.
    pub denylist: BTreeSet<String>,
}

impl PluginAccessPolicy {
    /// Returns a policy that permits all code types.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            allowlist: None,
            denylist: BTreeSet::new(),
        }
    }

    /// Returns true when the code type is allowed by policy.
    #[must_use]
    pub fn is_allowed(&self, code_type: &str) -> bool {
        if self.denylist.contains(code_type) {
            return false;
        }
        if let Some(allowlist) = &self.allowlist {
            return allowlist.contains(code_type);
        }
        true
    }
}

impl Default for PluginAccessPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

// ============================================================================
// SECTION: Plugin Registry
// ============================================================================

/// Deploy plugin handle stored by the registry.
type BoxedDeployPlugin = Box<dyn DeployPlugin + Send + Sync>;

/// Post-process plugin handle stored by the registry.
type BoxedPostProcessPlugin = Box<dyn PostProcessPlugin + Send + Sync>;

/// Plugin registry with policy enforcement.
pub struct PluginRegistryImpl {
    /// Deploy plugins in registration order.
    deploy_plugins: Vec<BoxedDeployPlugin>,
    /// Index into `deploy_plugins` by code type.
    by_code_type: BTreeMap<String, usize>,
    /// Post-process plugins in registration order.
    post_process: Vec<BoxedPostProcessPlugin>,
    /// Access control policy for code types.
    policy: PluginAccessPolicy,
}

impl PluginRegistryImpl {
    /// Creates an empty registry with the provided policy.
    #[must_use]
    pub const fn new(policy: PluginAccessPolicy) -> Self {
        Self {
            deploy_plugins: Vec::new(),
            by_code_type: BTreeMap::new(),
            post_process: Vec::new(),
            policy,
        }
    }

    /// Registers a deploy plugin for every code type it serves.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateCodeType`] when a code type is already
    /// served; the registry is left unchanged.
    pub fn register_deploy_plugin(
        &mut self,
        plugin: impl DeployPlugin + Send + Sync + 'static,
    ) -> Result<(), PluginError> {
        let code_types = plugin.code_types();
        let mut seen = BTreeSet::new();
        for code_type in &code_types {
            if self.by_code_type.contains_key(code_type) || !seen.insert(code_type.as_str()) {
                return Err(PluginError::DuplicateCodeType(code_type.clone()));
            }
        }
        let index = self.deploy_plugins.len();
        self.deploy_plugins.push(Box::new(plugin));
        for code_type in code_types {
            self.by_code_type.insert(code_type, index);
        }
        Ok(())
    }

    /// Registers a post-process plugin; plugins run in registration order.
    pub fn register_post_process_plugin(
        &mut self,
        plugin: impl PostProcessPlugin + Send + Sync + 'static,
    ) {
        self.post_process.push(Box::new(plugin));
    }

    /// Returns every registered code type in order.
    #[must_use]
    pub fn code_types(&self) -> Vec<&str> {
        self.by_code_type.keys().map(String::as_str).collect()
    }

    /// Returns the configured policy.
    #[must_use]
    pub const fn policy(&self) -> &PluginAccessPolicy {
        &self.policy
    }
}

impl Default for PluginRegistryImpl {
    fn default() -> Self {
        Self::new(PluginAccessPolicy::default())
    }
}

impl PluginRegistry for PluginRegistryImpl {
    fn get_deploy_plugin(&self, code_type: &str) -> Result<&dyn DeployPlugin, PluginError> {
        if !self.policy.is_allowed(code_type) {
            return Err(PluginError::Blocked(code_type.to_string()));
        }
        let plugin = self
            .by_code_type
            .get(code_type)
            .and_then(|index| self.deploy_plugins.get(*index))
            .ok_or_else(|| PluginError::MissingDeployPlugin(code_type.to_string()))?;
        Ok(plugin.as_ref())
    }

    fn post_process_plugins(&self) -> Vec<&dyn PostProcessPlugin> {
        self.post_process.iter().map(|plugin| plugin.as_ref() as &dyn PostProcessPlugin).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn denylist_wins_over_allowlist() {
        let policy = PluginAccessPolicy {
            allowlist: Some(BTreeSet::from(["helm".to_string()])),
            denylist: BTreeSet::from(["helm".to_string()]),
        };
        assert!(!policy.is_allowed("helm"));
        assert!(!policy.is_allowed("noop"));
        assert!(PluginAccessPolicy::allow_all().is_allowed("noop"));
    }
}
