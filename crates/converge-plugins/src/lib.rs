// converge-plugins/src/lib.rs
// ============================================================================
// Module: Converge Plugins
// Description: Plugin registry and built-in no-op plugins.
// Purpose: Route deploy calls by code type with access policy checks.
// Dependencies: converge-core, converge-lang, tracing
// ============================================================================

//! ## Overview
//! This crate ships a plugin registry implementing the core
//! [`converge_core::PluginRegistry`] interface and two built-in plugins: a
//! deploy plugin that records calls without touching any cluster, and a
//! post-process plugin that summarises instances per cluster. The registry
//! enforces an allowlist and denylist of code types and refuses to register
//! two deploy plugins for the same code type.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod noop;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use noop::NOOP_CODE_TYPE;
pub use noop::NoopDeployPlugin;
pub use noop::NoopPostProcessPlugin;
pub use registry::PluginAccessPolicy;
pub use registry::PluginRegistryImpl;
