// converge-lang/src/criteria.rs
// ============================================================================
// Module: Criteria
// Description: Require-all / require-none / require-any expression groups.
// Purpose: Gate contexts and global rules on labels and request objects.
// Dependencies: serde, thiserror, crate::{cache, expression}
// ============================================================================

//! ## Overview
//! [`Criteria`] bundles three lists of boolean expressions. A request is
//! allowed when every `require_all` expression holds, no `require_none`
//! expression holds, and at least one `require_any` expression holds (an
//! empty `require_any` list is satisfied by default). Groups are checked in
//! that order and evaluation stops at the first decisive expression.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::cache::ExpressionCache;
use crate::expression::ExpressionError;
use crate::expression::ExpressionParams;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure while evaluating one criteria expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("criteria expression `{expression}` failed: {source}")]
pub struct CriteriaError {
    /// Expression text that failed.
    pub expression: String,
    /// Underlying expression failure.
    #[source]
    pub source: ExpressionError,
}

impl CriteriaError {
    /// Returns true when the expression failed to compile.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        self.source.is_compile_error()
    }
}

// ============================================================================
// SECTION: Criteria
// ============================================================================

/// Groups of boolean expressions gating a context or rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Criteria {
    /// Expressions that must all be true.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub require_all: Vec<String>,
    /// Expressions of which at least one must be true, when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub require_any: Vec<String>,
    /// Expressions that must all be false.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub require_none: Vec<String>,
}

impl Criteria {
    /// Creates criteria that only use `require_all`.
    #[must_use]
    pub fn require_all<I, S>(expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            require_all: expressions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Returns true when no expression is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.require_all.is_empty() && self.require_any.is_empty() && self.require_none.is_empty()
    }

    /// Evaluates the criteria against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError`] when an expression fails to compile or
    /// evaluate. Undefined variables are not errors; they make the expression
    /// false.
    pub fn allows(
        &self,
        params: &ExpressionParams,
        cache: &ExpressionCache,
    ) -> Result<bool, CriteriaError> {
        for expression in &self.require_all {
            if !evaluate(expression, params, cache)? {
                return Ok(false);
            }
        }
        for expression in &self.require_none {
            if evaluate(expression, params, cache)? {
                return Ok(false);
            }
        }
        if self.require_any.is_empty() {
            return Ok(true);
        }
        for expression in &self.require_any {
            if evaluate(expression, params, cache)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Evaluates a single expression, attaching its text to failures.
fn evaluate(
    expression: &str,
    params: &ExpressionParams,
    cache: &ExpressionCache,
) -> Result<bool, CriteriaError> {
    cache.evaluate_bool(expression, params).map_err(|source| CriteriaError {
        expression: expression.to_string(),
        source,
    })
}
