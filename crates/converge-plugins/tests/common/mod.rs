// converge-plugins/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared policy, users, and plugins for registry tests.
// Purpose: Provide a small policy that applies end to end through the registry.
// Dependencies: converge-core, serde_yaml
// ============================================================================

//! ## Overview
//! A two-cluster policy with one `web` service whose single component is
//! deployed with the `noop` code type, plus a failing deploy plugin used to
//! exercise error paths.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use converge_core::Cluster;
use converge_core::DeployError;
use converge_core::DeployPlugin;
use converge_core::EventLog;
use converge_core::InMemorySecretLoader;
use converge_core::InMemoryUserLoader;
use converge_core::Policy;
use converge_core::PolicyResolution;
use converge_core::PolicyResolver;
use converge_core::ResolverConfig;
use converge_core::User;
use converge_lang::ParameterTree;

// ============================================================================
// SECTION: Test Fixtures
// ============================================================================

/// Web service policy in YAML form.
pub const POLICY_YAML: &str = r#"
clusters:
  edge-1:
    name: edge-1
    type: kubernetes
  edge-2:
    name: edge-2
    type: kubernetes
services:
  web:
    name: web
    owner: "0"
    contexts:
      - name: shared
        criteria:
          require_all: ["team != ''"]
        change_labels:
          set: { cluster: edge-1 }
        allocation:
          keys: ["{{ .Labels.team }}"]
    components:
      - name: server
        code:
          type: noop
          params:
            cluster: "{{ .Labels.cluster }}"
            team: "{{ .Labels.team }}"
dependencies:
  - id: red_web
    user_id: "1"
    service: web
  - id: blue_web
    user_id: "2"
    service: web
"#;

/// Parses the web policy.
#[must_use]
pub fn web_policy() -> Policy {
    serde_yaml::from_str(POLICY_YAML).expect("web policy parses")
}

/// Users on two teams, plus the service owner.
#[must_use]
pub fn web_users() -> InMemoryUserLoader {
    let user = |id: &str, name: &str, team: Option<&str>| User {
        id: id.to_string(),
        name: name.to_string(),
        labels: team.map(|team| ("team".to_string(), team.to_string())).into_iter().collect(),
        secrets: BTreeMap::new(),
    };
    InMemoryUserLoader::new([
        user("0", "Owner", None),
        user("1", "Ruby", Some("red")),
        user("2", "Blaise", Some("blue")),
    ])
}

/// Resolves the web policy.
#[must_use]
pub fn resolve_web(policy: &Policy) -> PolicyResolution {
    let users = web_users();
    let secrets = InMemorySecretLoader::new();
    PolicyResolver::new(policy, &users, &secrets, ResolverConfig::default())
        .resolve_all_dependencies()
        .expect("web policy resolves")
        .resolution
}

// ============================================================================
// SECTION: Test Plugins
// ============================================================================

/// Deploy plugin that rejects every call.
#[derive(Debug, Clone)]
pub struct FailingDeployPlugin {
    /// Code types claimed by the plugin.
    pub code_types: Vec<String>,
}

impl FailingDeployPlugin {
    /// Creates a failing plugin for one code type.
    #[must_use]
    pub fn for_type(code_type: &str) -> Self {
        Self {
            code_types: vec![code_type.to_string()],
        }
    }
}

impl DeployPlugin for FailingDeployPlugin {
    fn code_types(&self) -> Vec<String> {
        self.code_types.clone()
    }

    fn create(
        &self,
        _cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Err(DeployError::Failed(format!("create rejected for {deploy_name}")))
    }

    fn update(
        &self,
        _cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Err(DeployError::Failed(format!("update rejected for {deploy_name}")))
    }

    fn destroy(
        &self,
        _cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Err(DeployError::Failed(format!("destroy rejected for {deploy_name}")))
    }

    fn endpoints(
        &self,
        _cluster: &Cluster,
        _deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        Ok(BTreeMap::new())
    }
}
