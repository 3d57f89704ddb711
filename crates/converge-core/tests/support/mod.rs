// converge-core/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Shared result helpers, policy fixtures, and recording plugins.
// ============================================================================
//! ## Overview
//! Shared helpers for core integration tests. The fixture policy models a
//! `kafka` service that depends on `zookeeper`, with `test`, `prod-low`, and
//! `prod-high` contexts. `prod-high` disables zookeeper, so dependencies
//! landing there never resolve.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use converge_core::Cluster;
use converge_core::DeployError;
use converge_core::DeployPlugin;
use converge_core::EventLog;
use converge_core::InMemorySecretLoader;
use converge_core::InMemoryUserLoader;
use converge_core::PluginError;
use converge_core::PluginRegistry;
use converge_core::Policy;
use converge_core::PolicyResolution;
use converge_core::PolicyResolver;
use converge_core::PostProcessPlugin;
use converge_core::ResolutionOutput;
use converge_core::ResolveError;
use converge_core::ResolverConfig;
use converge_core::User;
use converge_lang::ParameterTree;

// ========================================================================
// Test Result Helpers
// ========================================================================

/// Standard result type used across core integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Lightweight error type for test assertions.
#[derive(Debug)]
struct TestError {
    /// Human-readable failure message.
    message: String,
}

impl fmt::Display for TestError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl Error for TestError {}

/// Returns an error when a test condition fails.
///
/// # Errors
/// Returns a `TestError` when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(Box::new(TestError {
            message: message.into(),
        }))
    }
}

// ========================================================================
// Fixtures
// ========================================================================

/// Fixture policy in YAML form.
pub const POLICY_YAML: &str = r#"
clusters:
  cluster-us-east:
    name: cluster-us-east
    type: kubernetes
  cluster-us-west:
    name: cluster-us-west
    type: kubernetes
rules:
  - name: forbid_blocked_users
    weight: 10
    criteria:
      require_all: ["blocked == true"]
    actions:
      dependency: forbid
  - name: no_ingress_in_test
    weight: 20
    criteria:
      require_all: ["test == true"]
    actions:
      ingress: block
services:
  zookeeper:
    name: zookeeper
    owner: "0"
    contexts:
      - name: test
        criteria:
          require_all: ["test == true"]
        change_labels:
          set: { cluster: cluster-us-east }
      - name: prod
        criteria:
          require_all: ["prod == true"]
          require_none: ["zookeeper_disabled == true"]
        change_labels:
          set: { cluster: cluster-us-west }
    components:
      - name: zookeeper
        code:
          type: noop
          params:
            name: "zk-{{ .Discovery.instance }}"
            cluster: "{{ .Labels.cluster }}"
            replicas: 1
        discovery:
          url: "zk-{{ .Discovery.instance }}:2181"
  kafka:
    name: kafka
    owner: "0"
    contexts:
      - name: test
        criteria:
          require_all: ["test == true"]
        change_labels:
          set: { cluster: cluster-us-east }
        allocation:
          keys: ["{{ .User.Name }}"]
      - name: prod-low
        criteria:
          require_all: ["prod == true", "priority < 200"]
        change_labels:
          set: { cluster: cluster-us-west }
      - name: prod-high
        criteria:
          require_all: ["prod == true", "priority >= 200"]
        change_labels:
          set: { cluster: cluster-us-west, zookeeper_disabled: "true" }
    components:
      - name: zookeeper
        service: zookeeper
      - name: kafka
        dependencies: [zookeeper]
        code:
          type: noop
          params:
            cluster: "{{ .Labels.cluster }}"
            zookeeper: "{{ .Discovery.zookeeper.instance }}"
            replicas: 3
dependencies:
  - id: alice_kafka
    user_id: "1"
    service: kafka
  - id: bob_kafka
    user_id: "2"
    service: kafka
  - id: carol_kafka
    user_id: "3"
    service: kafka
  - id: bob_zookeeper
    user_id: "2"
    service: zookeeper
  - id: dave_kafka
    user_id: "4"
    service: kafka
"#;

/// Parses the fixture policy.
pub fn fixture_policy() -> Policy {
    serde_yaml::from_str(POLICY_YAML).expect("fixture policy parses")
}

/// Builds a user with labels.
pub fn user(id: &str, name: &str, labels: &[(&str, &str)]) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        labels: labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        secrets: BTreeMap::new(),
    }
}

/// Fixture users: the service owner, Alice (test), Bob (prod-low), Carol
/// (prod-high), and Dave (blocked by rule).
pub fn fixture_users() -> InMemoryUserLoader {
    InMemoryUserLoader::new([
        user("0", "Admin", &[]),
        user("1", "Alice", &[("test", "true")]),
        user("2", "Bob", &[("prod", "true"), ("priority", "100")]),
        user("3", "Carol", &[("prod", "true"), ("priority", "300")]),
        user("4", "Dave", &[("test", "true"), ("blocked", "true")]),
    ])
}

/// Resolves `policy` against the fixture users.
pub fn resolve(policy: &Policy) -> Result<ResolutionOutput, ResolveError> {
    let users = fixture_users();
    let secrets = InMemorySecretLoader::new();
    PolicyResolver::new(policy, &users, &secrets, ResolverConfig::default())
        .resolve_all_dependencies()
}

/// Resolves the fixture policy and returns the resolution.
pub fn resolve_fixture() -> PolicyResolution {
    resolve(&fixture_policy()).expect("fixture policy resolves").resolution
}

// ========================================================================
// Recording Plugins
// ========================================================================

/// Deploy plugin that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingDeployPlugin {
    /// Calls as `op deploy_name cluster`.
    pub calls: RefCell<Vec<String>>,
    /// Deploy names whose calls fail.
    pub fail_on: Vec<String>,
}

impl RecordingDeployPlugin {
    /// Records one call and fails when configured to.
    fn call(&self, op: &str, cluster: &Cluster, deploy_name: &str) -> Result<(), DeployError> {
        if self.fail_on.iter().any(|name| name == deploy_name) {
            return Err(DeployError::Failed(format!("{op} refused for {deploy_name}")));
        }
        self.calls.borrow_mut().push(format!("{op} {deploy_name} {}", cluster.name));
        Ok(())
    }
}

impl DeployPlugin for RecordingDeployPlugin {
    fn code_types(&self) -> Vec<String> {
        vec!["noop".to_string()]
    }

    fn create(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        self.call("create", cluster, deploy_name)
    }

    fn update(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        self.call("update", cluster, deploy_name)
    }

    fn destroy(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        self.call("destroy", cluster, deploy_name)
    }

    fn endpoints(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        _params: &ParameterTree,
        _event_log: &mut EventLog,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        let url = format!("https://{deploy_name}.{}", cluster.name);
        Ok([("url".to_string(), url)].into_iter().collect())
    }
}

/// Post-process plugin counting its runs.
#[derive(Debug, Default)]
pub struct CountingPostProcess {
    /// Number of runs.
    pub runs: RefCell<usize>,
}

impl PostProcessPlugin for CountingPostProcess {
    fn name(&self) -> &str {
        "counting"
    }

    fn process(
        &self,
        _desired_policy: &Policy,
        _desired_state: &PolicyResolution,
        _actual_state: &PolicyResolution,
        _event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        *self.runs.borrow_mut() += 1;
        Ok(())
    }
}

/// Registry serving the recording plugin for `noop` code.
#[derive(Debug, Default)]
pub struct TestRegistry {
    /// Deploy plugin.
    pub deploy: RecordingDeployPlugin,
    /// Post-process plugin.
    pub post_process: CountingPostProcess,
}

impl PluginRegistry for TestRegistry {
    fn get_deploy_plugin(&self, code_type: &str) -> Result<&dyn DeployPlugin, PluginError> {
        if code_type == "noop" {
            Ok(&self.deploy)
        } else {
            Err(PluginError::MissingDeployPlugin(code_type.to_string()))
        }
    }

    fn post_process_plugins(&self) -> Vec<&dyn PostProcessPlugin> {
        vec![&self.post_process]
    }
}
