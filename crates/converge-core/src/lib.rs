// converge-core/src/lib.rs
// ============================================================================
// Module: Converge Core Library
// Description: Public API surface for the Converge policy engine core.
// Purpose: Expose the policy model, interfaces, and runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Converge core resolves a declarative policy (services, contexts, rules,
//! clusters, and user dependencies) into concrete component instances,
//! diffs the result against the previously applied state, and applies the
//! resulting plan through deploy plugins. All I/O lives behind the traits in
//! [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ActualStateUpdater;
pub use interfaces::DeployError;
pub use interfaces::DeployPlugin;
pub use interfaces::ExternalData;
pub use interfaces::PluginError;
pub use interfaces::PluginRegistry;
pub use interfaces::PostProcessPlugin;
pub use interfaces::SecretLoader;
pub use interfaces::StateUpdateError;
pub use interfaces::UserLoader;
pub use interfaces::UserLoaderError;
pub use runtime::Action;
pub use runtime::ActionContext;
pub use runtime::ActionError;
pub use runtime::Applier;
pub use runtime::ApplyError;
pub use runtime::InMemoryActualStateStore;
pub use runtime::InMemorySecretLoader;
pub use runtime::InMemoryUserLoader;
pub use runtime::KeyDependency;
pub use runtime::PolicyResolver;
pub use runtime::ResolutionDiff;
pub use runtime::ResolutionOutput;
pub use runtime::ResolveError;
pub use runtime::ResolveErrorKind;
pub use runtime::ResolverConfig;
pub use runtime::plan_text;
