// converge-config/src/lib.rs
// ============================================================================
// Module: Converge Config Library
// Description: Canonical config model, validation, and logging setup.
// Purpose: Single source of truth for converge.toml semantics.
// Dependencies: converge-core, converge-plugins, serde, toml, tracing-subscriber
// ============================================================================

//! ## Overview
//! `converge-config` defines the configuration model for the policy engine.
//! It loads `converge.toml` with strict size limits, validates every section
//! fail-closed, and builds the resolver settings, plugin registry, and
//! tracing subscriber the rest of the workspace consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod logging;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use logging::init_logging;
