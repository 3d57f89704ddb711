// converge-plugins/src/noop.rs
// ============================================================================
// Module: No-op Plugins
// Description: Deploy and post-process plugins that touch no cluster.
// Purpose: Let plans apply end to end without a real deployment backend.
// Dependencies: converge-core, converge-lang, tracing
// ============================================================================

//! ## Overview
//! [`NoopDeployPlugin`] accepts every deploy call for its configured code
//! types and only records it in the event log. [`NoopPostProcessPlugin`]
//! summarises the actual state per cluster after each apply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use converge_core::Cluster;
use converge_core::DeployError;
use converge_core::DeployPlugin;
use converge_core::EventLog;
use converge_core::Policy;
use converge_core::PolicyResolution;
use converge_core::PostProcessPlugin;
use converge_lang::ParameterTree;
use tracing::debug;

// ============================================================================
// SECTION: Deploy Plugin
// ============================================================================

/// Default code type served by [`NoopDeployPlugin`].
pub const NOOP_CODE_TYPE: &str = "noop";

/// Deploy plugin that records calls without deploying anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoopDeployPlugin {
    /// Code types this plugin serves.
    code_types: Vec<String>,
}

impl NoopDeployPlugin {
    /// Creates a plugin serving `code_types`.
    #[must_use]
    pub fn new(code_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            code_types: code_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Records one deploy call.
    fn record(
        op: &str,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) {
        debug!(op, cluster = %cluster.name, deploy_name, "noop deploy call");
        event_log
            .debug(format!("noop {op}: {deploy_name}"))
            .field("cluster", &cluster.name)
            .field("params", params);
    }
}

impl Default for NoopDeployPlugin {
    fn default() -> Self {
        Self::new([NOOP_CODE_TYPE])
    }
}

impl DeployPlugin for NoopDeployPlugin {
    fn code_types(&self) -> Vec<String> {
        self.code_types.clone()
    }

    fn create(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Self::record("create", cluster, deploy_name, params, event_log);
        Ok(())
    }

    fn update(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Self::record("update", cluster, deploy_name, params, event_log);
        Ok(())
    }

    fn destroy(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        Self::record("destroy", cluster, deploy_name, params, event_log);
        Ok(())
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

// ============================================================================
// SECTION: Post-Process Plugin
// ============================================================================

/// Post-process plugin that logs instance counts per cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopPostProcessPlugin;

impl NoopPostProcessPlugin {
    /// Counts instances per cluster name; service-level keys are skipped.
    #[must_use]
    pub fn instances_per_cluster(state: &PolicyResolution) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for instance in state.component_instance_map.values() {
            if instance.key.is_service() {
                continue;
            }
            *counts.entry(instance.key.cluster_name.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl PostProcessPlugin for NoopPostProcessPlugin {
    fn name(&self) -> &str {
        "noop"
    }

    fn process(
        &self,
        desired_policy: &Policy,
        desired_state: &PolicyResolution,
        actual_state: &PolicyResolution,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError> {
        let desired = Self::instances_per_cluster(desired_state);
        let actual = Self::instances_per_cluster(actual_state);
        for name in desired_policy.clusters.keys() {
            let wanted = desired.get(name).copied().unwrap_or(0);
            let running = actual.get(name).copied().unwrap_or(0);
            event_log
                .info(format!("Cluster '{name}' post-processed"))
                .field("desired", wanted)
                .field("actual", running);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
