// converge-core/src/runtime/action.rs
// ============================================================================
// Module: Actions
// Description: Reconciliation actions and their execution against plugins.
// Purpose: Move the actual state one step toward the desired state.
// Dependencies: converge-lang, serde, thiserror, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! An [`Action`] is one step of a reconciliation plan produced by the diff
//! engine. Applying an action calls the deploy plugin serving the
//! component's code type (when there is one), then records the change in the
//! actual state and persists it through the [`ActualStateUpdater`].
//!
//! Service-level keys and components without code are markers: they skip
//! the plugin call but still update the actual state, so the next diff
//! against the actual state is empty.
//!
//! Endpoint refreshes run after every lifecycle action of a plan and store
//! what the deploy plugin reports on the actual instance.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use converge_lang::LABEL_CLUSTER;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Cluster;
use crate::core::Code;
use crate::core::ComponentInstance;
use crate::core::EventLog;
use crate::core::Policy;
use crate::core::PolicyResolution;
use crate::core::Timestamp;
use crate::interfaces::ActualStateUpdater;
use crate::interfaces::DeployError;
use crate::interfaces::ExternalData;
use crate::interfaces::PluginError;
use crate::interfaces::PluginRegistry;
use crate::interfaces::StateUpdateError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Action execution errors.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The instance the action refers to does not exist.
    #[error("component instance `{key}` not found in {state} state")]
    MissingInstance {
        /// Instance key.
        key: String,
        /// Which state was consulted (`desired` or `actual`).
        state: &'static str,
    },
    /// The owning service is not in the policy.
    #[error("service `{service}` for component instance `{key}` not found in policy")]
    MissingService {
        /// Instance key.
        key: String,
        /// Service name.
        service: String,
    },
    /// The component is not part of its service.
    #[error("component `{component}` for component instance `{key}` not found in policy")]
    MissingComponent {
        /// Instance key.
        key: String,
        /// Component name.
        component: String,
    },
    /// The target cluster is not in the policy.
    #[error("cluster `{cluster}` for component instance `{key}` not found in policy")]
    MissingCluster {
        /// Instance key.
        key: String,
        /// Cluster name.
        cluster: String,
    },
    /// No permitted deploy plugin serves the code type.
    #[error(transparent)]
    Plugin(#[from] PluginError),
    /// The deploy plugin failed.
    #[error("deploy of component instance `{key}` failed: {source}")]
    Deploy {
        /// Instance key.
        key: String,
        /// Plugin failure.
        source: DeployError,
    },
    /// A post-process plugin failed.
    #[error("post-process plugin `{plugin}` failed: {source}")]
    PostProcess {
        /// Plugin name.
        plugin: String,
        /// Plugin failure.
        source: DeployError,
    },
    /// The actual state could not be persisted.
    #[error(transparent)]
    State(#[from] StateUpdateError),
}

// ============================================================================
// SECTION: Action Context
// ============================================================================

/// Everything an action needs while it runs.
pub struct ActionContext<'a> {
    /// Policy the desired state was resolved from.
    pub desired_policy: &'a Policy,
    /// Desired state.
    pub desired_state: &'a PolicyResolution,
    /// Policy the actual state was applied from.
    pub actual_policy: &'a Policy,
    /// Actual state, edited as actions succeed.
    pub actual_state: &'a mut PolicyResolution,
    /// Persistence hook for the actual state.
    pub state_updater: &'a dyn ActualStateUpdater,
    /// User and secret directories.
    pub external_data: &'a ExternalData,
    /// Plugin lookup.
    pub plugins: &'a dyn PluginRegistry,
    /// Event sink.
    pub event_log: &'a mut EventLog,
    /// Apply clock.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Actions
// ============================================================================

/// One reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Deploy a new instance.
    ComponentCreate {
        /// Instance key.
        key: String,
    },
    /// Redeploy an instance with new parameters.
    ComponentUpdate {
        /// Instance key.
        key: String,
    },
    /// Tear an instance down.
    ComponentDelete {
        /// Instance key.
        key: String,
    },
    /// Record a new consumer of an instance.
    ComponentAttachDependency {
        /// Instance key.
        key: String,
        /// Dependency id.
        dependency: String,
    },
    /// Drop a consumer of an instance.
    ComponentDetachDependency {
        /// Instance key.
        key: String,
        /// Dependency id.
        dependency: String,
    },
    /// Refresh the endpoints recorded on an actual instance.
    ComponentEndpoints {
        /// Instance key.
        key: String,
    },
    /// Run every post-process plugin once.
    ClustersPostProcess,
}

/// Deploy plugin operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeployOp {
    /// `DeployPlugin::create`.
    Create,
    /// `DeployPlugin::update`.
    Update,
    /// `DeployPlugin::destroy`.
    Destroy,
}

/// Code and target cluster of a deployable instance.
struct DeployTarget<'p> {
    /// Component code.
    code: &'p Code,
    /// Cluster the instance runs on.
    cluster: &'p Cluster,
}

impl Action {
    /// Returns the instance key the action targets, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ComponentCreate {
                key,
            }
            | Self::ComponentUpdate {
                key,
            }
            | Self::ComponentDelete {
                key,
            }
            | Self::ComponentAttachDependency {
                key, ..
            }
            | Self::ComponentDetachDependency {
                key, ..
            }
            | Self::ComponentEndpoints {
                key,
            } => Some(key),
            Self::ClustersPostProcess => None,
        }
    }

    /// Returns the one-line marker description, e.g. `[+] key`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::ComponentCreate {
                key,
            } => format!("[+] {key}"),
            Self::ComponentDelete {
                key,
            } => format!("[-] {key}"),
            Self::ComponentUpdate {
                key,
            } => format!("[*] {key}"),
            Self::ComponentAttachDependency {
                key,
                dependency,
            } => format!("[>] {key} = {dependency}"),
            Self::ComponentDetachDependency {
                key,
                dependency,
            } => format!("[<] {key} = {dependency}"),
            Self::ComponentEndpoints {
                key,
            } => format!("[@] {key}"),
            Self::ClustersPostProcess => "[!] post-process".to_string(),
        }
    }

    /// Executes the action.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when the instance, policy objects, or plugin
    /// cannot be found, or when the plugin or state store fails. The actual
    /// state is left unchanged on failure.
    pub fn apply(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        match self {
            Self::ComponentCreate {
                key,
            } => apply_create(key, ctx),
            Self::ComponentUpdate {
                key,
            } => apply_update(key, ctx),
            Self::ComponentDelete {
                key,
            } => apply_delete(key, ctx),
            Self::ComponentAttachDependency {
                key,
                dependency,
            } => apply_dependency_change(key, dependency, true, ctx),
            Self::ComponentDetachDependency {
                key,
                dependency,
            } => apply_dependency_change(key, dependency, false, ctx),
            Self::ComponentEndpoints {
                key,
            } => apply_endpoints(key, ctx),
            Self::ClustersPostProcess => apply_post_process(ctx),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

// ============================================================================
// SECTION: Action Bodies
// ============================================================================

/// Deploys a desired instance and records it without consumers; attach
/// actions that follow fill the consumer set.
fn apply_create(key: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
    let desired = desired_instance(key, ctx)?;
    deploy(ctx.desired_policy, desired, DeployOp::Create, ctx.plugins, ctx.event_log)?;
    let mut created = desired.clone();
    created.dependency_ids.clear();
    created.update_times(ctx.now, ctx.now);
    ctx.state_updater.create(&created)?;
    ctx.actual_state.put_instance(created);
    ctx.event_log.info(format!("Created component instance: {key}"));
    Ok(())
}

/// Redeploys a desired instance, keeping the actual consumers and creation
/// time.
fn apply_update(key: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
    let desired = desired_instance(key, ctx)?;
    deploy(ctx.desired_policy, desired, DeployOp::Update, ctx.plugins, ctx.event_log)?;
    let mut updated = desired.clone();
    if let Some(actual) = ctx.actual_state.instance(key) {
        updated.dependency_ids.clone_from(&actual.dependency_ids);
        updated.endpoints.clone_from(&actual.endpoints);
        updated.update_times(actual.created_on, actual.updated_on);
    }
    updated.update_times(Timestamp::UNSET, ctx.now);
    ctx.state_updater.update(&updated)?;
    ctx.actual_state.put_instance(updated);
    ctx.event_log.info(format!("Updated component instance: {key}"));
    Ok(())
}

/// Tears an actual instance down using the policy it was applied from.
fn apply_delete(key: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
    let actual = ctx.actual_state.instance(key).ok_or_else(|| ActionError::MissingInstance {
        key: key.to_string(),
        state: "actual",
    })?;
    deploy(ctx.actual_policy, actual, DeployOp::Destroy, ctx.plugins, ctx.event_log)?;
    ctx.state_updater.delete(key)?;
    ctx.actual_state.remove_instance(key);
    ctx.event_log.info(format!("Destroyed component instance: {key}"));
    Ok(())
}

/// Adds or removes a consumer on the actual instance. Absent instances are
/// left alone.
fn apply_dependency_change(
    key: &str,
    dependency: &str,
    attach: bool,
    ctx: &mut ActionContext<'_>,
) -> Result<(), ActionError> {
    let Some(actual) = ctx.actual_state.instance(key) else {
        ctx.event_log.debug(format!("No actual instance to edit consumers of: {key}"));
        return Ok(());
    };
    let mut changed = actual.clone();
    if attach {
        changed.add_dependency(dependency);
    } else {
        changed.remove_dependency(dependency);
    }
    ctx.state_updater.update(&changed)?;
    ctx.actual_state.put_instance(changed);
    let verb = if attach { "Attached" } else { "Detached" };
    ctx.event_log
        .info(format!("{verb} dependency on component instance: {key}"))
        .field("dependency", dependency);
    Ok(())
}

/// Asks the deploy plugin for the endpoints of an actual instance and
/// records them. Absent instances and instances without code are skipped.
fn apply_endpoints(key: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
    let Some(actual) = ctx.actual_state.instance(key) else {
        ctx.event_log.debug(format!("No actual instance to fetch endpoints of: {key}"));
        return Ok(());
    };
    let Some(target) = deploy_target(ctx.desired_policy, actual)? else {
        return Ok(());
    };
    ctx.event_log.info(format!("Getting endpoints for component instance: {key}"));
    let plugin = ctx.plugins.get_deploy_plugin(&target.code.code_type)?;
    let endpoints: BTreeMap<String, String> = plugin
        .endpoints(
            target.cluster,
            &actual.key.deploy_name(),
            &actual.calculated_code_params,
            ctx.event_log,
        )
        .map_err(|source| ActionError::Deploy {
            key: key.to_string(),
            source,
        })?;
    if endpoints == actual.endpoints {
        return Ok(());
    }
    let mut changed = actual.clone();
    changed.endpoints = endpoints;
    ctx.state_updater.update(&changed)?;
    ctx.event_log
        .info(format!("Recorded endpoints of component instance: {key}"))
        .field("endpoints", changed.endpoints.len());
    ctx.actual_state.put_instance(changed);
    Ok(())
}

/// Runs every post-process plugin in registration order.
fn apply_post_process(ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
    for plugin in ctx.plugins.post_process_plugins() {
        plugin
            .process(ctx.desired_policy, ctx.desired_state, ctx.actual_state, ctx.event_log)
            .map_err(|source| ActionError::PostProcess {
                plugin: plugin.name().to_string(),
                source,
            })?;
        ctx.event_log.debug(format!("Post-processed clusters with plugin: {}", plugin.name()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Looks `key` up in the desired state.
fn desired_instance<'c>(
    key: &str,
    ctx: &ActionContext<'c>,
) -> Result<&'c ComponentInstance, ActionError> {
    ctx.desired_state.instance(key).ok_or_else(|| ActionError::MissingInstance {
        key: key.to_string(),
        state: "desired",
    })
}

/// Resolves the code and cluster of `instance`. Service-level keys and
/// components without code have no target.
///
/// The cluster is taken from the `cluster` code parameter, falling back to
/// the cluster part of the key.
fn deploy_target<'p>(
    policy: &'p Policy,
    instance: &ComponentInstance,
) -> Result<Option<DeployTarget<'p>>, ActionError> {
    let key = &instance.key;
    if key.is_service() {
        return Ok(None);
    }
    let service = policy.service(&key.service_name).ok_or_else(|| ActionError::MissingService {
        key: key.key(),
        service: key.service_name.clone(),
    })?;
    let component =
        service.component(&key.component_name).ok_or_else(|| ActionError::MissingComponent {
            key: key.key(),
            component: key.component_name.clone(),
        })?;
    let Some(code) = &component.code else {
        return Ok(None);
    };

    let cluster_name = instance
        .calculated_code_params
        .get_str(LABEL_CLUSTER)
        .unwrap_or(key.cluster_name.as_str());
    let cluster = policy.cluster(cluster_name).ok_or_else(|| ActionError::MissingCluster {
        key: key.key(),
        cluster: cluster_name.to_string(),
    })?;
    Ok(Some(DeployTarget {
        code,
        cluster,
    }))
}

/// Calls the deploy plugin for `instance` when it has code.
fn deploy(
    policy: &Policy,
    instance: &ComponentInstance,
    op: DeployOp,
    plugins: &dyn PluginRegistry,
    event_log: &mut EventLog,
) -> Result<(), ActionError> {
    let Some(DeployTarget {
        code,
        cluster,
    }) = deploy_target(policy, instance)?
    else {
        return Ok(());
    };
    let key = &instance.key;
    let plugin = plugins.get_deploy_plugin(&code.code_type)?;
    let deploy_name = key.deploy_name();
    let params = &instance.calculated_code_params;
    let result = match op {
        DeployOp::Create => plugin.create(cluster, &deploy_name, params, event_log),
        DeployOp::Update => plugin.update(cluster, &deploy_name, params, event_log),
        DeployOp::Destroy => plugin.destroy(cluster, &deploy_name, params, event_log),
    };
    result.map_err(|source| ActionError::Deploy {
        key: key.key(),
        source,
    })
}
