// converge-lang/src/labels.rs
// ============================================================================
// Module: Label Sets
// Description: String label maps with copy-on-write transforms and merges.
// Purpose: Carry request-scoped labels through policy resolution.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`LabelSet`] is the working set of key/value labels that flows from a
//! dependency down through every service it reaches. Label sets are never
//! mutated in place by the engine: [`LabelSet::apply_transform`] and
//! [`LabelSet::add_labels`] return fresh copies so sibling branches of a
//! resolution never observe each other's edits.
//!
//! Keys that originate from user secrets are tracked separately so event logs
//! can report how many secrets were in play without printing their values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved label naming the cluster a service instance is placed on.
pub const LABEL_CLUSTER: &str = "cluster";

// ============================================================================
// SECTION: Label Operations
// ============================================================================

/// Set/remove operations applied to a [`LabelSet`].
///
/// # Invariants
/// - `set` entries are applied before `remove` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelOperations {
    /// Labels to add or overwrite.
    pub set: BTreeMap<String, String>,
    /// Label keys to drop. Values are ignored.
    pub remove: BTreeMap<String, String>,
}

impl LabelOperations {
    /// Creates label operations from explicit set and remove maps.
    #[must_use]
    pub const fn new(set: BTreeMap<String, String>, remove: BTreeMap<String, String>) -> Self {
        Self {
            set,
            remove,
        }
    }

    /// Creates operations that set a single label.
    #[must_use]
    pub fn set_single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut set = BTreeMap::new();
        set.insert(key.into(), value.into());
        Self {
            set,
            remove: BTreeMap::new(),
        }
    }

    /// Creates operations that remove a single label.
    #[must_use]
    pub fn remove_single(key: impl Into<String>) -> Self {
        let mut remove = BTreeMap::new();
        remove.insert(key.into(), String::new());
        Self {
            set: BTreeMap::new(),
            remove,
        }
    }

    /// Returns true when the operations would not change any label set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

// ============================================================================
// SECTION: Label Set
// ============================================================================

/// Key/value label map with secret provenance tracking.
///
/// # Invariants
/// - Equality compares label entries only; two empty sets are always equal.
/// - Every key in `secrets` was introduced by [`LabelSet::add_secrets`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSet {
    /// Label entries.
    pub labels: BTreeMap<String, String>,
    /// Keys whose values came from user secrets.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub secrets: BTreeSet<String>,
}

impl LabelSet {
    /// Creates a label set from a map of labels.
    #[must_use]
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            secrets: BTreeSet::new(),
        }
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns true when `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true when the set holds no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the number of labels that originated from secrets.
    #[must_use]
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    /// Returns a copy with `ops` applied: sets first, then removals.
    #[must_use]
    pub fn apply_transform(&self, ops: &LabelOperations) -> Self {
        let mut result = self.clone();
        for (key, value) in &ops.set {
            result.labels.insert(key.clone(), value.clone());
            result.secrets.remove(key);
        }
        for key in ops.remove.keys() {
            result.labels.remove(key);
            result.secrets.remove(key);
        }
        result
    }

    /// Returns a merged copy where entries from `other` win on conflict.
    #[must_use]
    pub fn add_labels(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, value) in &other.labels {
            result.labels.insert(key.clone(), value.clone());
            if other.secrets.contains(key) {
                result.secrets.insert(key.clone());
            } else {
                result.secrets.remove(key);
            }
        }
        result
    }

    /// Returns a merged copy with `secrets` added and tracked as secret keys.
    #[must_use]
    pub fn add_secrets(&self, secrets: &BTreeMap<String, String>) -> Self {
        let mut result = self.clone();
        for (key, value) in secrets {
            result.labels.insert(key.clone(), value.clone());
            result.secrets.insert(key.clone());
        }
        result
    }

    /// Iterates labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for LabelSet {}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self::new(labels)
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
