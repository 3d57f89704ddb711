// converge-lang/src/cache.rs
// ============================================================================
// Module: Compile Caches
// Description: Concurrent memoization of compiled expressions and templates.
// Purpose: Compile each distinct source string once per resolver run.
// Dependencies: dashmap, crate::{expression, template}
// ============================================================================

//! ## Overview
//! [`CompileCache`] maps source text to an `Arc` of its compiled form. Lookups
//! and inserts go through a sharded concurrent map, so callers may share one
//! cache across threads. Compilation happens outside the shard lock; when two
//! callers race on the same source, the first insert wins and both observe the
//! stored entry. Compile failures are not cached.
//!
//! Caches are plain values owned by whoever drives evaluation (normally a
//! policy resolver), never process-wide state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use dashmap::DashMap;

use crate::expression::DEFAULT_MAX_EXPRESSION_BYTES;
use crate::expression::Expression;
use crate::expression::ExpressionError;
use crate::expression::ExpressionParams;
use crate::template::DEFAULT_MAX_TEMPLATE_BYTES;
use crate::template::Template;
use crate::template::TemplateError;
use crate::template::TemplateParams;

// ============================================================================
// SECTION: Compile Trait
// ============================================================================

/// Source-compiled artifacts that can be memoized.
pub trait Compile: Sized {
    /// Compilation error type.
    type Error;

    /// Compiles `source`, rejecting inputs larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns the artifact's compile error when `source` is malformed.
    fn compile_source(source: &str, max_bytes: usize) -> Result<Self, Self::Error>;
}

impl Compile for Expression {
    type Error = ExpressionError;

    fn compile_source(source: &str, max_bytes: usize) -> Result<Self, Self::Error> {
        Self::compile_with_limit(source, max_bytes)
    }
}

impl Compile for Template {
    type Error = TemplateError;

    fn compile_source(source: &str, max_bytes: usize) -> Result<Self, Self::Error> {
        Self::compile_with_limit(source, max_bytes)
    }
}

// ============================================================================
// SECTION: Generic Cache
// ============================================================================

/// Concurrent source-to-compiled-form cache.
///
/// # Invariants
/// - At most one compiled entry is stored per source string.
/// - Once stored, an entry is never replaced.
#[derive(Debug)]
pub struct CompileCache<T> {
    /// Compiled entries keyed by source text.
    entries: DashMap<String, Arc<T>>,
    /// Maximum accepted source size in bytes.
    max_bytes: usize,
}

impl<T: Compile> CompileCache<T> {
    /// Creates an empty cache with the given source size limit.
    #[must_use]
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_bytes,
        }
    }

    /// Returns the cached entry for `source`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns the compile error when `source` is malformed.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<T>, T::Error> {
        if let Some(entry) = self.entries.get(source) {
            return Ok(Arc::clone(entry.value()));
        }
        let compiled = Arc::new(T::compile_source(source, self.max_bytes)?);
        let entry = self.entries.entry(source.to_string()).or_insert(compiled);
        Ok(Arc::clone(entry.value()))
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: Expression Cache
// ============================================================================

/// Cache of compiled boolean expressions.
#[derive(Debug)]
pub struct ExpressionCache {
    /// Compiled expressions.
    inner: CompileCache<Expression>,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionCache {
    /// Creates a cache with the default expression size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_EXPRESSION_BYTES)
    }

    /// Creates a cache with an explicit expression size limit.
    #[must_use]
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            inner: CompileCache::with_limit(max_bytes),
        }
    }

    /// Compiles (or fetches) and evaluates `source` as a boolean.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] on compile or evaluation failure.
    pub fn evaluate_bool(
        &self,
        source: &str,
        params: &ExpressionParams,
    ) -> Result<bool, ExpressionError> {
        self.inner.get_or_compile(source)?.evaluate_bool(params)
    }

    /// Returns the number of cached expressions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when no expression has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// ============================================================================
// SECTION: Template Cache
// ============================================================================

/// Cache of compiled string templates.
#[derive(Debug)]
pub struct TemplateCache {
    /// Compiled templates.
    inner: CompileCache<Template>,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCache {
    /// Creates a cache with the default template size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_TEMPLATE_BYTES)
    }

    /// Creates a cache with an explicit template size limit.
    #[must_use]
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            inner: CompileCache::with_limit(max_bytes),
        }
    }

    /// Compiles (or fetches) and renders `source`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] on compile or render failure.
    pub fn render(&self, source: &str, params: &TemplateParams) -> Result<String, TemplateError> {
        self.inner.get_or_compile(source)?.render(params)
    }

    /// Returns the number of cached templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when no template has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
