// converge-lang/src/params.rs
// ============================================================================
// Module: Parameter Trees
// Description: Nested string/int/bool parameter maps with template evaluation.
// Purpose: Model component code params, discovery params, and cluster config.
// Dependencies: serde, serde_json, thiserror, crate::{cache, template}
// ============================================================================

//! ## Overview
//! A [`ParameterTree`] is a sorted map whose leaves are strings, integers, or
//! booleans and whose interior nodes are nested trees. Policy authors write
//! them as free-form YAML/JSON maps; the untagged serde representation maps
//! scalars directly onto [`ParameterValue`] variants. Any other shape (lists,
//! floats, nulls) is rejected at deserialization time.
//!
//! Evaluation renders every string leaf as a template and escapes the result
//! so it is safe to embed in instance names. Integers and booleans pass
//! through unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::cache::TemplateCache;
use crate::template::TemplateError;
use crate::template::TemplateParams;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Template failure at a specific parameter path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parameter `{path}`: {source}")]
pub struct ParameterError {
    /// Dotted path of the failing leaf.
    pub path: String,
    /// Underlying template failure.
    #[source]
    pub source: TemplateError,
}

impl ParameterError {
    /// Returns true when the underlying template failed to compile.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        self.source.is_compile_error()
    }
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Boolean leaf.
    Bool(bool),
    /// Integer leaf.
    Int(i64),
    /// String leaf, template-evaluated on resolution.
    String(String),
    /// Nested tree.
    Map(ParameterTree),
}

impl ParameterValue {
    /// Returns the string content for string leaves.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the nested tree for map values.
    #[must_use]
    pub const fn as_tree(&self) -> Option<&ParameterTree> {
        match self {
            Self::Map(tree) => Some(tree),
            _ => None,
        }
    }

    /// Converts the value into JSON for template and expression contexts.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Bool(flag) => JsonValue::Bool(*flag),
            Self::Int(number) => JsonValue::from(*number),
            Self::String(text) => JsonValue::String(text.clone()),
            Self::Map(tree) => tree.to_json(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(number) => write!(f, "{number}"),
            Self::String(text) => write!(f, "\"{text}\""),
            Self::Map(tree) => write!(f, "{tree}"),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<ParameterTree> for ParameterValue {
    fn from(value: ParameterTree) -> Self {
        Self::Map(value)
    }
}

// ============================================================================
// SECTION: Tree
// ============================================================================

/// Sorted nested parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTree(BTreeMap<String, ParameterValue>);

impl ParameterTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.0.get(key)
    }

    /// Returns the string leaf at `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ParameterValue::as_str)
    }

    /// Returns the nested tree at `key`.
    #[must_use]
    pub fn nested(&self, key: &str) -> Option<&Self> {
        self.0.get(key).and_then(ParameterValue::as_tree)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) -> Option<ParameterValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns true when the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Converts the tree into a JSON object.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
        )
    }

    /// Lists field-level differences from `self` to `other`.
    ///
    /// Changed leaves render as `path: old -> new`; keys present only in
    /// `other` render as `+path: new`; keys present only in `self` render as
    /// `-path: old`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut lines = Vec::new();
        diff_into(self, other, "", &mut lines);
        lines
    }

    /// Renders string leaves as templates and escapes the results.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] naming the first leaf that failed.
    pub fn evaluate(
        &self,
        templates: &TemplateCache,
        params: &TemplateParams,
    ) -> Result<Self, ParameterError> {
        evaluate_tree(self, templates, params, "")
    }
}

impl fmt::Display for ParameterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterTree
where
    K: Into<String>,
    V: Into<ParameterValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Replaces characters that are not allowed in instance names.
#[must_use]
pub fn escape_name(value: &str) -> String {
    value.replace('#', "-")
}

/// Joins a parent path and a key with a dot.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") }
}

/// Recursive body of [`ParameterTree::diff`].
fn diff_into(left: &ParameterTree, right: &ParameterTree, prefix: &str, lines: &mut Vec<String>) {
    for (key, old) in &left.0 {
        let path = join_path(prefix, key);
        match (old, right.0.get(key)) {
            (_, None) => lines.push(format!("-{path}: {old}")),
            (ParameterValue::Map(old_tree), Some(ParameterValue::Map(new_tree))) => {
                diff_into(old_tree, new_tree, &path, lines);
            }
            (_, Some(new)) if new != old => lines.push(format!("{path}: {old} -> {new}")),
            _ => {}
        }
    }
    for (key, new) in &right.0 {
        if !left.0.contains_key(key) {
            lines.push(format!("+{}: {new}", join_path(prefix, key)));
        }
    }
}

/// Recursive body of [`ParameterTree::evaluate`].
fn evaluate_tree(
    tree: &ParameterTree,
    templates: &TemplateCache,
    params: &TemplateParams,
    prefix: &str,
) -> Result<ParameterTree, ParameterError> {
    let mut result = BTreeMap::new();
    for (key, value) in &tree.0 {
        let path = join_path(prefix, key);
        let evaluated = match value {
            ParameterValue::String(source) => {
                let rendered = templates.render(source, params).map_err(|source| {
                    ParameterError {
                        path: path.clone(),
                        source,
                    }
                })?;
                ParameterValue::String(escape_name(&rendered))
            }
            ParameterValue::Map(nested) => {
                ParameterValue::Map(evaluate_tree(nested, templates, params, &path)?)
            }
            ParameterValue::Bool(_) | ParameterValue::Int(_) => value.clone(),
        };
        result.insert(key.clone(), evaluated);
    }
    Ok(ParameterTree(result))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
