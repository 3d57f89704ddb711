// converge-core/src/runtime/diff.rs
// ============================================================================
// Module: Resolution Diff
// Description: Reconciliation of a desired resolution against the previous one.
// Purpose: Produce the ordered action plan and propagate instance timestamps.
// Dependencies: serde, crate::{core, runtime::action}
// ============================================================================

//! ## Overview
//! [`ResolutionDiff::new`] compares every key present on either side by its
//! consumer set and code parameters:
//! - no consumers before, some after: instantiate
//! - consumers before, none after: destruct
//! - consumers on both sides with different code params: update, and the
//!   parent service instance is marked updated as well
//!
//! Consumer differences become attach and detach actions. Actions are
//! collected per key, emitted in the processing order of `next` and then of
//! `prev`. Within a key, lifecycle actions come first, then detaches, then
//! attaches. Every created or updated component then gets an endpoints
//! refresh, and one post-process action always closes the plan.
//!
//! The only mutation is timestamp propagation into `next`; `prev` is never
//! touched. Destructed instances are snapshotted into
//! [`ResolutionDiff::destructed`] instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ComponentInstance;
use crate::core::PolicyResolution;
use crate::core::Timestamp;
use crate::core::is_service_key;
use crate::runtime::action::Action;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A consumer edge between an instance key and a dependency id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyDependency {
    /// Instance key.
    pub key: String,
    /// Dependency id.
    pub dependency_id: String,
}

/// Differences between two resolutions and the plan reconciling them.
///
/// # Invariants
/// - `actions` ends with exactly one [`Action::ClustersPostProcess`].
/// - No key has more than one [`Action::ComponentUpdate`] in `actions`.
/// - [`Action::ComponentEndpoints`] actions follow every per-key action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDiff {
    /// Keys to instantiate.
    pub component_instantiate: BTreeSet<String>,
    /// Keys to destruct.
    pub component_destruct: BTreeSet<String>,
    /// Keys to update, including synthesized parent services.
    pub component_update: BTreeSet<String>,
    /// Consumers gained.
    pub component_attach_dependency: Vec<KeyDependency>,
    /// Consumers lost.
    pub component_detach_dependency: Vec<KeyDependency>,
    /// Snapshots of destructed instances with `updated_on` set to the diff
    /// time.
    pub destructed: BTreeMap<String, ComponentInstance>,
    /// Ordered plan.
    pub actions: Vec<Action>,
    /// Whether the policy object counts differ.
    pub policy_summary_changed: bool,
}

// ============================================================================
// SECTION: Diff
// ============================================================================

impl ResolutionDiff {
    /// Diffs `next` against `prev` using `now` as the change time.
    #[must_use]
    pub fn new(next: &mut PolicyResolution, prev: &PolicyResolution, now: Timestamp) -> Self {
        let mut diff = Self {
            policy_summary_changed: next.policy_summary != prev.policy_summary,
            ..Self::default()
        };
        let mut buckets: BTreeMap<String, Vec<Action>> = BTreeMap::new();
        let mut refreshed: BTreeSet<String> = BTreeSet::new();

        let keys: BTreeSet<String> = prev
            .component_instance_map
            .keys()
            .chain(next.component_instance_map.keys())
            .cloned()
            .collect();
        for key in &keys {
            if diff.compare_key(key, next, prev, now, &mut buckets) && !is_service_key(key) {
                refreshed.insert(key.clone());
            }
        }

        let order =
            next.component_processing_order.iter().chain(&prev.component_processing_order);
        let mut endpoints = Vec::with_capacity(refreshed.len());
        for key in order {
            if refreshed.remove(key) {
                endpoints.push(Action::ComponentEndpoints {
                    key: key.clone(),
                });
            }
            if let Some(bucket) = buckets.remove(key) {
                diff.actions.extend(normalize(bucket));
            }
        }
        for bucket in buckets.into_values() {
            diff.actions.extend(normalize(bucket));
        }
        endpoints.extend(refreshed.into_iter().map(|key| Action::ComponentEndpoints {
            key,
        }));
        diff.actions.extend(endpoints);
        diff.actions.push(Action::ClustersPostProcess);
        diff
    }

    /// Diffs `next` against `prev` at the current wall-clock time.
    #[must_use]
    pub fn compute(next: &mut PolicyResolution, prev: &PolicyResolution) -> Self {
        Self::new(next, prev, Timestamp::now())
    }

    /// Plans a full redeploy: every instance of `next` is instantiated and
    /// attached to all of its consumers.
    #[must_use]
    pub fn full_update(next: &mut PolicyResolution, now: Timestamp) -> Self {
        let mut diff = Self {
            policy_summary_changed: true,
            ..Self::default()
        };
        let mut keys: Vec<String> = next.component_processing_order.clone();
        let ordered: BTreeSet<&String> = keys.iter().collect();
        let rest: Vec<String> = next
            .component_instance_map
            .keys()
            .filter(|key| !ordered.contains(key))
            .cloned()
            .collect();
        keys.extend(rest);

        let mut endpoints = Vec::new();
        for key in keys {
            let Some(instance) = next.instance_mut(&key) else {
                continue;
            };
            instance.update_times(now, now);
            diff.component_instantiate.insert(key.clone());
            diff.actions.push(Action::ComponentCreate {
                key: key.clone(),
            });
            if !instance.key.is_service() {
                endpoints.push(Action::ComponentEndpoints {
                    key: key.clone(),
                });
            }
            for dependency in &instance.dependency_ids {
                diff.component_attach_dependency.push(KeyDependency {
                    key: key.clone(),
                    dependency_id: dependency.clone(),
                });
                diff.actions.push(Action::ComponentAttachDependency {
                    key: key.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        diff.actions.extend(endpoints);
        diff.actions.push(Action::ClustersPostProcess);
        diff
    }

    /// Returns true when any instance or consumer changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.component_instantiate.is_empty()
            || !self.component_destruct.is_empty()
            || !self.component_update.is_empty()
            || !self.component_attach_dependency.is_empty()
            || !self.component_detach_dependency.is_empty()
    }

    /// Returns true when a new revision should be stored: something changed
    /// in the deployed world or in the policy object counts.
    #[must_use]
    pub fn should_generate_new_revision(&self) -> bool {
        self.has_changes() || self.policy_summary_changed
    }

    /// Renders consumer changes of service instances and component counts.
    #[must_use]
    pub fn summary_text(&self) -> String {
        if !self.has_changes() {
            return "No changes\n".to_string();
        }
        let attached = self
            .component_attach_dependency
            .iter()
            .filter(|edge| is_service_key(&edge.key))
            .map(|edge| format!("[+] {} -> {}\n", edge.dependency_id, edge.key));
        let detached = self
            .component_detach_dependency
            .iter()
            .filter(|edge| is_service_key(&edge.key))
            .map(|edge| format!("[-] {} -> {}\n", edge.dependency_id, edge.key));
        let counts = format!(
            "New: {}, Deleted: {}, Updated: {}\n",
            count_components(&self.component_instantiate),
            count_components(&self.component_destruct),
            count_components(&self.component_update)
        );
        let mut lines: Vec<String> = attached.chain(detached).collect();
        lines.push(counts);
        lines.concat()
    }

    /// Classifies one key and queues its actions. Returns true when the key
    /// itself is instantiated or updated.
    fn compare_key(
        &mut self,
        key: &str,
        next: &mut PolicyResolution,
        prev: &PolicyResolution,
        now: Timestamp,
        buckets: &mut BTreeMap<String, Vec<Action>>,
    ) -> bool {
        let prev_instance = prev.instance(key);
        let empty = BTreeSet::new();
        let deps_prev = prev_instance.map_or(&empty, |instance| &instance.dependency_ids);
        let deps_next: BTreeSet<String> =
            next.instance(key).map(|instance| instance.dependency_ids.clone()).unwrap_or_default();

        let mut changed = false;
        match (prev_instance, deps_prev.is_empty(), deps_next.is_empty()) {
            (_, true, false) => {
                changed = true;
                self.component_instantiate.insert(key.to_string());
                push(buckets, key, Action::ComponentCreate {
                    key: key.to_string(),
                });
                if let Some(instance) = next.instance_mut(key) {
                    instance.update_times(now, now);
                }
            }
            (Some(previous), false, true) => {
                self.component_destruct.insert(key.to_string());
                push(buckets, key, Action::ComponentDelete {
                    key: key.to_string(),
                });
                let mut snapshot = previous.clone();
                snapshot.update_times(Timestamp::UNSET, now);
                self.destructed.insert(key.to_string(), snapshot);
            }
            (Some(previous), false, false) => {
                let Some(instance) = next.instance_mut(key) else {
                    return false;
                };
                instance.update_times(previous.created_on, previous.updated_on);
                if instance.calculated_code_params != previous.calculated_code_params {
                    changed = true;
                    instance.update_times(Timestamp::UNSET, now);
                    let is_component = instance.key.is_component();
                    let parent_key = instance.key.parent_service_key().key();
                    self.mark_updated(key, buckets);
                    if is_component {
                        self.mark_updated(&parent_key, buckets);
                        if let Some(parent_instance) = next.instance_mut(&parent_key) {
                            parent_instance.update_times(Timestamp::UNSET, now);
                        }
                    }
                }
            }
            _ => {}
        }

        for dependency in deps_prev.difference(&deps_next) {
            self.component_detach_dependency.push(KeyDependency {
                key: key.to_string(),
                dependency_id: dependency.clone(),
            });
            push(buckets, key, Action::ComponentDetachDependency {
                key: key.to_string(),
                dependency: dependency.clone(),
            });
        }
        for dependency in deps_next.difference(deps_prev) {
            self.component_attach_dependency.push(KeyDependency {
                key: key.to_string(),
                dependency_id: dependency.clone(),
            });
            push(buckets, key, Action::ComponentAttachDependency {
                key: key.to_string(),
                dependency: dependency.clone(),
            });
        }
        changed
    }

    /// Records an update for `key`.
    fn mark_updated(&mut self, key: &str, buckets: &mut BTreeMap<String, Vec<Action>>) {
        self.component_update.insert(key.to_string());
        push(buckets, key, Action::ComponentUpdate {
            key: key.to_string(),
        });
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends `action` to the bucket of `key`.
fn push(buckets: &mut BTreeMap<String, Vec<Action>>, key: &str, action: Action) {
    buckets.entry(key.to_string()).or_default().push(action);
}

/// Orders a bucket as lifecycle, detach, attach, keeping the first update
/// and dropping the rest.
fn normalize(mut bucket: Vec<Action>) -> Vec<Action> {
    bucket.sort_by_key(|action| match action {
        Action::ComponentDetachDependency {
            ..
        } => 1,
        Action::ComponentAttachDependency {
            ..
        } => 2,
        _ => 0,
    });
    let mut seen_update = false;
    bucket
        .into_iter()
        .filter(|action| {
            if matches!(action, Action::ComponentUpdate { .. }) {
                if seen_update {
                    return false;
                }
                seen_update = true;
            }
            true
        })
        .collect()
}

/// Counts component-level keys.
fn count_components(keys: &BTreeSet<String>) -> usize {
    keys.iter().filter(|key| !is_service_key(key)).count()
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
    use crate::core::ComponentInstanceKey;

    fn service_key() -> ComponentInstanceKey {
        ComponentInstanceKey::new(Some("c1"), "svc", "ctx", &[], "svc", None)
    }

    fn resolution(replicas: i64, dependencies: &[&str]) -> PolicyResolution {
        let mut resolution = PolicyResolution::new();
        let component = service_key().with_component("app");
        for dependency in dependencies {
            resolution
                .record_code_params(&component, [("replicas", replicas)].into_iter().collect())
                .unwrap();
            resolution.record_resolved(&component, dependency);
            resolution.record_resolved(&service_key(), dependency);
        }
        resolution
    }

    #[test]
    fn normalize_keeps_first_update_only() {
        let update = Action::ComponentUpdate {
            key: "k".to_string(),
        };
        let attach = Action::ComponentAttachDependency {
            key: "k".to_string(),
            dependency: "d".to_string(),
        };
        let out = normalize(vec![update.clone(), update.clone(), attach.clone(), update.clone()]);
        assert_eq!(out, vec![update, attach]);
    }

    #[test]
    fn normalize_puts_synthesized_update_before_consumer_changes() {
        let attach = Action::ComponentAttachDependency {
            key: "k".to_string(),
            dependency: "d2".to_string(),
        };
        let detach = Action::ComponentDetachDependency {
            key: "k".to_string(),
            dependency: "d1".to_string(),
        };
        let update = Action::ComponentUpdate {
            key: "k".to_string(),
        };
        let out = normalize(vec![attach.clone(), detach.clone(), update.clone()]);
        assert_eq!(out, vec![update, detach, attach]);
    }

    #[test]
    fn new_instances_get_both_timestamps() {
        let mut next = resolution(1, &["d1"]);
        let now = Timestamp::from_unix_millis(1_000);
        let diff = ResolutionDiff::new(&mut next, &PolicyResolution::new(), now);
        assert_eq!(diff.component_instantiate.len(), 2);
        for instance in next.component_instance_map.values() {
            assert_eq!(instance.created_on, now);
            assert_eq!(instance.updated_on, now);
        }
        assert_eq!(diff.actions.last(), Some(&Action::ClustersPostProcess));
        let expected = format!("[+] d1 -> {}\nNew: 1, Deleted: 0, Updated: 0\n", service_key());
        assert_eq!(diff.summary_text(), expected);
    }

    #[test]
    fn changed_params_update_component_and_parent_once() {
        let created = Timestamp::from_unix_millis(1_000);
        let mut prev = resolution(1, &["d1"]);
        let _ = ResolutionDiff::new(&mut prev, &PolicyResolution::new(), created);

        let mut next = resolution(2, &["d1"]);
        let later = Timestamp::from_unix_millis(2_000);
        let diff = ResolutionDiff::new(&mut next, &prev, later);
        let component = service_key().with_component("app").key();
        let expected: BTreeSet<String> = [component.clone(), service_key().key()].into();
        assert_eq!(diff.component_update, expected);
        let updates =
            diff.actions.iter().filter(|action| matches!(action, Action::ComponentUpdate { .. }));
        assert_eq!(updates.count(), 2);

        let instance = next.instance(&component).unwrap();
        assert_eq!(instance.created_on, created);
        assert_eq!(instance.updated_on, later);
        assert_eq!(next.instance(&service_key().key()).unwrap().updated_on, later);
    }

    #[test]
    fn removed_instances_are_snapshotted_without_touching_prev() {
        let mut prev = resolution(1, &["d1"]);
        let first = Timestamp::from_unix_millis(5);
        let _ = ResolutionDiff::new(&mut prev, &PolicyResolution::new(), first);
        let before = prev.clone();

        let mut next = PolicyResolution::new();
        let now = Timestamp::from_unix_millis(9);
        let diff = ResolutionDiff::new(&mut next, &prev, now);
        assert_eq!(prev, before);
        assert_eq!(diff.component_destruct.len(), 2);
        assert!(diff.destructed.values().all(|instance| instance.updated_on == now));
        assert_eq!(diff.component_detach_dependency.len(), 2);
        assert!(diff.should_generate_new_revision());
    }

    #[test]
    fn identical_resolutions_produce_no_changes() {
        let mut prev = resolution(1, &["d1", "d2"]);
        let first = Timestamp::from_unix_millis(5);
        let _ = ResolutionDiff::new(&mut prev, &PolicyResolution::new(), first);
        let mut next = resolution(1, &["d1", "d2"]);
        let diff = ResolutionDiff::new(&mut next, &prev, Timestamp::from_unix_millis(6));
        assert!(!diff.should_generate_new_revision());
        assert_eq!(diff.actions, vec![Action::ClustersPostProcess]);
        assert_eq!(diff.summary_text(), "No changes\n");
        assert_eq!(next, prev);
    }

    #[test]
    fn full_update_recreates_everything() {
        let mut next = resolution(1, &["d1"]);
        let diff = ResolutionDiff::full_update(&mut next, Timestamp::from_unix_millis(3));
        assert_eq!(diff.component_instantiate.len(), 2);
        assert_eq!(diff.component_attach_dependency.len(), 2);
        assert_eq!(diff.actions.len(), 6);
        let component = service_key().with_component("app").key();
        assert_eq!(diff.actions[4], Action::ComponentEndpoints {
            key: component,
        });
    }
}
