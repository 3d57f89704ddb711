// converge-core/src/core/resolution.rs
// ============================================================================
// Module: Policy Resolution
// Description: Resolved desired or actual state keyed by instance key.
// Purpose: Aggregate component instances, the dependency index, and the
//          processing order shared by resolution, diffing, and apply.
// Dependencies: converge-lang, serde
// ============================================================================

//! ## Overview
//! [`PolicyResolution`] is the output of the resolver and the input of the
//! diff engine. Instances are created on first touch and merged into
//! afterwards. The processing order lists each resolved key once, in the
//! order resolution first completed it, and is the only valid execution
//! order for actions.
//!
//! Resolutions round-trip losslessly through serde. The membership index
//! behind the processing order is rebuilt on demand after deserialization.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use converge_lang::LabelSet;
use converge_lang::ParameterTree;
use serde::Deserialize;
use serde::Serialize;

use crate::core::instance::ComponentInstance;
use crate::core::instance::ConflictError;
use crate::core::key::ComponentInstanceKey;
use crate::core::policy::PolicySummary;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolved state for a set of dependencies.
///
/// # Invariants
/// - `component_processing_order` holds no duplicates.
/// - Every key in `component_processing_order` is present in
///   `component_instance_map`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyResolution {
    /// Instances by key string.
    #[serde(default)]
    pub component_instance_map: BTreeMap<String, ComponentInstance>,
    /// Resolved dependency id to service-level key string.
    #[serde(default)]
    pub dependency_instance_map: BTreeMap<String, String>,
    /// Keys in the order resolution completed them.
    #[serde(default)]
    pub component_processing_order: Vec<String>,
    /// Object counts of the policy this resolution came from.
    #[serde(default)]
    pub policy_summary: PolicySummary,
    /// Membership index for `component_processing_order`.
    #[serde(skip)]
    processed: BTreeSet<String>,
}

impl PartialEq for PolicyResolution {
    fn eq(&self, other: &Self) -> bool {
        self.component_instance_map == other.component_instance_map
            && self.dependency_instance_map == other.dependency_instance_map
            && self.component_processing_order == other.component_processing_order
            && self.policy_summary == other.policy_summary
    }
}

impl Eq for PolicyResolution {}

impl PolicyResolution {
    /// Creates an empty resolution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for `key`, creating it on first use.
    pub fn get_component_instance_entry(
        &mut self,
        key: &ComponentInstanceKey,
    ) -> &mut ComponentInstance {
        self.component_instance_map
            .entry(key.key())
            .or_insert_with(|| ComponentInstance::new(key.clone()))
    }

    /// Marks `key` as resolved for `dependency_id` and records its order.
    pub fn record_resolved(&mut self, key: &ComponentInstanceKey, dependency_id: &str) {
        self.get_component_instance_entry(key).add_dependency(dependency_id);
        self.record_processing_order(&key.key());
    }

    /// Merges labels into the instance at `key`.
    pub fn record_labels(&mut self, key: &ComponentInstanceKey, labels: &LabelSet) {
        self.get_component_instance_entry(key).add_labels(labels);
    }

    /// Records code parameters for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when different parameters were recorded.
    pub fn record_code_params(
        &mut self,
        key: &ComponentInstanceKey,
        params: ParameterTree,
    ) -> Result<(), ConflictError> {
        self.get_component_instance_entry(key).add_code_params(params)
    }

    /// Records discovery parameters for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when different parameters were recorded.
    pub fn record_discovery_params(
        &mut self,
        key: &ComponentInstanceKey,
        params: ParameterTree,
    ) -> Result<(), ConflictError> {
        self.get_component_instance_entry(key).add_discovery_params(params)
    }

    /// Records an edge from `src` to `dst` on both instances.
    pub fn store_edge(&mut self, src: &ComponentInstanceKey, dst: &ComponentInstanceKey) {
        self.get_component_instance_entry(src).add_edge_out(dst.key());
        self.get_component_instance_entry(dst).add_edge_in(src.key());
    }

    /// Records that `dependency_id` resolved to the service at `service_key`.
    pub fn record_dependency(&mut self, dependency_id: &str, service_key: &ComponentInstanceKey) {
        self.dependency_instance_map.insert(dependency_id.to_string(), service_key.key());
    }

    /// Merges `other` into this resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] when an instance present on both sides has
    /// different code or discovery parameters.
    pub fn append_data(&mut self, other: &Self) -> Result<(), ConflictError> {
        for instance in other.component_instance_map.values() {
            self.get_component_instance_entry(&instance.key).append_data(instance)?;
        }
        for key in &other.component_processing_order {
            self.record_processing_order(key);
        }
        for (dependency_id, key) in &other.dependency_instance_map {
            self.dependency_instance_map.insert(dependency_id.clone(), key.clone());
        }
        Ok(())
    }

    /// Returns true when `dependency_id` resolved.
    #[must_use]
    pub fn is_resolved(&self, dependency_id: &str) -> bool {
        self.dependency_instance_map.contains_key(dependency_id)
    }

    /// Returns the service-level key string `dependency_id` resolved to.
    #[must_use]
    pub fn service_key(&self, dependency_id: &str) -> Option<&str> {
        self.dependency_instance_map.get(dependency_id).map(String::as_str)
    }

    /// Returns the instance stored under `key`.
    #[must_use]
    pub fn instance(&self, key: &str) -> Option<&ComponentInstance> {
        self.component_instance_map.get(key)
    }

    /// Returns the instance stored under `key` mutably.
    pub fn instance_mut(&mut self, key: &str) -> Option<&mut ComponentInstance> {
        self.component_instance_map.get_mut(key)
    }

    /// Stores `instance`, replacing any previous entry, and records its order.
    pub fn put_instance(&mut self, instance: ComponentInstance) {
        let key = instance.key_string();
        self.component_instance_map.insert(key.clone(), instance);
        self.record_processing_order(&key);
    }

    /// Removes the instance under `key` along with its order entry.
    pub fn remove_instance(&mut self, key: &str) -> Option<ComponentInstance> {
        self.sync_processed();
        if self.processed.remove(key) {
            self.component_processing_order.retain(|entry| entry != key);
        }
        self.component_instance_map.remove(key)
    }

    /// Returns the number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.component_instance_map.len()
    }

    /// Returns true when no instance exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.component_instance_map.is_empty()
    }

    /// Appends `key` to the processing order unless already present.
    fn record_processing_order(&mut self, key: &str) {
        self.sync_processed();
        if self.processed.insert(key.to_string()) {
            self.component_processing_order.push(key.to_string());
        }
    }

    /// Rebuilds the membership index when it is out of step with the order.
    fn sync_processed(&mut self) {
        if self.processed.len() != self.component_processing_order.len() {
            self.processed = self.component_processing_order.iter().cloned().collect();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
