// converge-core/src/core/instance.rs
// ============================================================================
// Module: Component Instances
// Description: Resolved per-key instance data accumulated across dependencies.
// Purpose: Hold labels, parameters, edges, consumers, and timestamps per key.
// Dependencies: converge-lang, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`ComponentInstance`] is created lazily the first time resolution touches
//! its key and is then merged into as more dependencies reach the same key.
//! Labels, edges, and consumers union; code and discovery parameters must be
//! identical across every path that reaches the instance, otherwise the policy
//! asks one physical instance to run with two configurations and resolution
//! fails with a [`ConflictError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use converge_lang::LabelSet;
use converge_lang::ParameterTree;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::key::ComponentInstanceKey;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Plugin data key recording whether global rules allow ingress.
pub const ALLOW_INGRESS: &str = "allow_ingress";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Which parameter tree conflicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Component code parameters.
    Code,
    /// Component discovery parameters.
    Discovery,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => f.write_str("code"),
            Self::Discovery => f.write_str("discovery"),
        }
    }
}

/// Two resolution paths produced different parameters for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "conflicting {kind} parameters for component instance {key}: existing {existing}, new {new} \
     (diff: {})",
    .diff.join("; ")
)]
pub struct ConflictError {
    /// Instance key string.
    pub key: String,
    /// Conflicting parameter tree.
    pub kind: ParamKind,
    /// Parameters already recorded.
    pub existing: ParameterTree,
    /// Parameters that disagreed.
    pub new: ParameterTree,
    /// Field-level differences from `existing` to `new`.
    pub diff: Vec<String>,
}

// ============================================================================
// SECTION: Component Instance
// ============================================================================

/// Resolved data for a single component instance key.
///
/// # Invariants
/// - `created_on` only moves backward and `updated_on` only moves forward
///   through [`ComponentInstance::update_times`].
/// - Resolution leaves both timestamps unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstance {
    /// Instance identity.
    pub key: ComponentInstanceKey,
    /// Dependencies keeping this instance alive.
    #[serde(default)]
    pub dependency_ids: BTreeSet<String>,
    /// Labels seen by every path reaching this instance, merged.
    #[serde(default)]
    pub calculated_labels: LabelSet,
    /// Evaluated discovery parameters.
    #[serde(default)]
    pub calculated_discovery: ParameterTree,
    /// Evaluated code parameters.
    #[serde(default)]
    pub calculated_code_params: ParameterTree,
    /// Keys with edges into this instance.
    #[serde(default)]
    pub edges_in: BTreeSet<String>,
    /// Keys this instance has edges to.
    #[serde(default)]
    pub edges_out: BTreeSet<String>,
    /// Flags recorded for deploy plugins.
    #[serde(default)]
    pub data_for_plugins: BTreeMap<String, String>,
    /// Endpoints reported by the deploy plugin. Only set in actual state.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, String>,
    /// First time the instance was applied.
    #[serde(default)]
    pub created_on: Timestamp,
    /// Last time the instance was applied.
    #[serde(default)]
    pub updated_on: Timestamp,
}

impl ComponentInstance {
    /// Creates an empty instance for `key`.
    #[must_use]
    pub fn new(key: ComponentInstanceKey) -> Self {
        Self {
            key,
            dependency_ids: BTreeSet::new(),
            calculated_labels: LabelSet::default(),
            calculated_discovery: ParameterTree::new(),
            calculated_code_params: ParameterTree::new(),
            edges_in: BTreeSet::new(),
            edges_out: BTreeSet::new(),
            data_for_plugins: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            created_on: Timestamp::UNSET,
            updated_on: Timestamp::UNSET,
        }
    }

    /// Returns the canonical key string.
    #[must_use]
    pub fn key_string(&self) -> String {
        self.key.key()
    }

    /// Adds a consuming dependency.
    pub fn add_dependency(&mut self, dependency_id: impl Into<String>) {
        self.dependency_ids.insert(dependency_id.into());
    }

    /// Removes a consuming dependency, returning whether it was present.
    pub fn remove_dependency(&mut self, dependency_id: &str) -> bool {
        self.dependency_ids.remove(dependency_id)
    }

    /// Merges labels into the calculated label set.
    pub fn add_labels(&mut self, labels: &LabelSet) {
        self.calculated_labels = self.calculated_labels.add_labels(labels);
    }

    /// Records code parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when different parameters were already
    /// recorded.
    pub fn add_code_params(&mut self, params: ParameterTree) -> Result<(), ConflictError> {
        let key = self.key_string();
        record_params(&mut self.calculated_code_params, params, key, ParamKind::Code)
    }

    /// Records discovery parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when different parameters were already
    /// recorded.
    pub fn add_discovery_params(&mut self, params: ParameterTree) -> Result<(), ConflictError> {
        let key = self.key_string();
        record_params(&mut self.calculated_discovery, params, key, ParamKind::Discovery)
    }

    /// Records an incoming edge.
    pub fn add_edge_in(&mut self, source: impl Into<String>) {
        self.edges_in.insert(source.into());
    }

    /// Records an outgoing edge.
    pub fn add_edge_out(&mut self, destination: impl Into<String>) {
        self.edges_out.insert(destination.into());
    }

    /// Records whether global rules allow ingress to this instance.
    pub fn add_rule_information(&mut self, allows_ingress: bool) {
        self.data_for_plugins.insert(ALLOW_INGRESS.to_string(), allows_ingress.to_string());
    }

    /// Moves `created_on` back to `created` and `updated_on` forward to
    /// `updated`. Unset inputs never overwrite set values.
    pub fn update_times(&mut self, created: Timestamp, updated: Timestamp) {
        if self.created_on.is_unset() || (!created.is_unset() && created < self.created_on) {
            self.created_on = created;
        }
        if !updated.is_unset() && updated > self.updated_on {
            self.updated_on = updated;
        }
    }

    /// Merges another instance for the same key into this one.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when code or discovery parameters disagree.
    pub fn append_data(&mut self, other: &Self) -> Result<(), ConflictError> {
        self.dependency_ids.extend(other.dependency_ids.iter().cloned());
        self.add_labels(&other.calculated_labels);
        self.add_discovery_params(other.calculated_discovery.clone())?;
        self.add_code_params(other.calculated_code_params.clone())?;
        self.edges_in.extend(other.edges_in.iter().cloned());
        self.edges_out.extend(other.edges_out.iter().cloned());
        for (name, value) in &other.data_for_plugins {
            self.data_for_plugins.insert(name.clone(), value.clone());
        }
        self.update_times(other.created_on, other.updated_on);
        Ok(())
    }
}

/// Stores `params` into an empty slot or checks it matches the stored tree.
fn record_params(
    slot: &mut ParameterTree,
    params: ParameterTree,
    key: String,
    kind: ParamKind,
) -> Result<(), ConflictError> {
    if slot.is_empty() {
        *slot = params;
        return Ok(());
    }
    if *slot == params {
        return Ok(());
    }
    Err(ConflictError {
        key,
        kind,
        diff: slot.diff(&params),
        existing: slot.clone(),
        new: params,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
