// converge-core/src/core/mod.rs
// ============================================================================
// Module: Converge Core Types
// Description: Policy model, instance keys, resolutions, and revisions.
// Purpose: Provide the serializable data model shared by resolver and diff.
// Dependencies: converge-lang, serde
// ============================================================================

//! ## Overview
//! Core types describe the declarative policy and the resolved state it
//! produces. They carry no behavior beyond local invariants; resolution and
//! reconciliation live in [`crate::runtime`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod event_log;
pub mod instance;
pub mod key;
pub mod policy;
pub mod resolution;
pub mod revision;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use event_log::Event;
pub use event_log::EventLog;
pub use event_log::Level;
pub use instance::ALLOW_INGRESS;
pub use instance::ComponentInstance;
pub use instance::ConflictError;
pub use instance::ParamKind;
pub use key::ComponentInstanceKey;
pub use key::KEY_SEPARATOR;
pub use key::ROOT_COMPONENT_NAME;
pub use key::UNRESOLVED_NAME;
pub use key::is_service_key;
pub use policy::Allocation;
pub use policy::Cluster;
pub use policy::Code;
pub use policy::Context;
pub use policy::Dependency;
pub use policy::DependencyAction;
pub use policy::IngressAction;
pub use policy::Policy;
pub use policy::PolicyError;
pub use policy::PolicySummary;
pub use policy::Rule;
pub use policy::RuleActions;
pub use policy::RuleError;
pub use policy::RuleOutcome;
pub use policy::Service;
pub use policy::ServiceComponent;
pub use policy::User;
pub use resolution::PolicyResolution;
pub use revision::Revision;
pub use revision::RevisionError;
pub use time::Timestamp;
