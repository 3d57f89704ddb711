// converge-core/src/runtime/mod.rs
// ============================================================================
// Module: Converge Runtime
// Description: Resolver, diff engine, actions, applier, and in-memory stores.
// Purpose: Turn a policy into desired state and reconcile it with actual state.
// Dependencies: crate::{core, interfaces}, converge-lang
// ============================================================================

//! ## Overview
//! The runtime runs in three steps. The [`PolicyResolver`] turns a policy
//! into the desired [`crate::core::PolicyResolution`]. The
//! [`ResolutionDiff`] compares it against the previous resolution and plans
//! [`Action`]s. The [`Applier`] runs the plan against deploy plugins.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod action;
pub mod apply;
pub mod diff;
pub mod plan;
pub mod resolver;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use action::Action;
pub use action::ActionContext;
pub use action::ActionError;
pub use apply::Applier;
pub use apply::ApplyError;
pub use diff::KeyDependency;
pub use diff::ResolutionDiff;
pub use plan::plan_text;
pub use resolver::NodeOutcome;
pub use resolver::PolicyResolver;
pub use resolver::ResolutionOutput;
pub use resolver::ResolveError;
pub use resolver::ResolveErrorKind;
pub use resolver::ResolverConfig;
pub use resolver::TraversalContext;
pub use store::InMemoryActualStateStore;
pub use store::InMemorySecretLoader;
pub use store::InMemoryUserLoader;
