// converge-lang/src/lib.rs
// ============================================================================
// Module: Converge Lang
// Description: Public API surface for the policy language primitives.
// Purpose: Expose labels, parameters, expressions, templates, and criteria.
// Dependencies: crate::{cache, criteria, expression, labels, params, template}
// ============================================================================

//! ## Overview
//! Pure, I/O-free building blocks used by the policy engine:
//! - [`LabelSet`] carries request labels through resolution.
//! - [`ParameterTree`] models free-form code, discovery, and cluster params.
//! - [`Expression`] and [`Criteria`] gate contexts and rules.
//! - [`Template`] renders allocation keys and parameter values.
//! - [`ExpressionCache`] and [`TemplateCache`] memoize compiled sources.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod criteria;
pub mod expression;
pub mod labels;
pub mod params;
pub mod template;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CompileCache;
pub use cache::ExpressionCache;
pub use cache::TemplateCache;
pub use criteria::Criteria;
pub use criteria::CriteriaError;
pub use expression::Expression;
pub use expression::ExpressionError;
pub use expression::ExpressionParams;
pub use expression::SyntaxError;
pub use labels::LABEL_CLUSTER;
pub use labels::LabelOperations;
pub use labels::LabelSet;
pub use params::ParameterError;
pub use params::ParameterTree;
pub use params::ParameterValue;
pub use params::escape_name;
pub use template::Template;
pub use template::TemplateError;
pub use template::TemplateParams;
