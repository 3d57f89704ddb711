// converge-core/src/core/key.rs
// ============================================================================
// Module: Component Instance Keys
// Description: Canonical identity of a resolved service or component instance.
// Purpose: Provide the sole lookup key used by resolution, diffing, and apply.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ComponentInstanceKey`] names one resolved instance by cluster, contract,
//! context (with resolved allocation keys), service, and component. The
//! service-level instance uses the reserved component name `root`. The string
//! form joins all parts with `#` and is what every map, edge, and diff uses.
//!
//! Deploy names and instance ids are short stable hashes of the key string,
//! suitable for naming objects inside a cluster.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between key parts.
pub const KEY_SEPARATOR: &str = "#";
/// Placeholder used for parts that have not been resolved.
pub const UNRESOLVED_NAME: &str = "unknown";
/// Component name of service-level instances.
pub const ROOT_COMPONENT_NAME: &str = "root";

/// FNV-1a 64-bit offset basis.
const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime.
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;
/// FNV-1a 32-bit offset basis.
const FNV32_OFFSET: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
const FNV32_PRIME: u32 = 0x0100_0193;

// ============================================================================
// SECTION: Key
// ============================================================================

/// Canonical identity of a component instance.
///
/// # Invariants
/// - `component_name == "root"` exactly when the key addresses a service-level
///   instance.
/// - `context_name_with_keys` starts with `context_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentInstanceKey {
    /// Cluster the instance runs on.
    pub cluster_name: String,
    /// Contract the instance was reached through.
    pub contract_name: String,
    /// Matched context name.
    pub context_name: String,
    /// Context name joined with resolved allocation keys.
    pub context_name_with_keys: String,
    /// Service name.
    pub service_name: String,
    /// Component name, or `root` for the service-level instance.
    pub component_name: String,
}

impl ComponentInstanceKey {
    /// Builds a key. Missing cluster or component fall back to the
    /// `unknown` placeholder and `root` respectively.
    #[must_use]
    pub fn new(
        cluster: Option<&str>,
        contract: &str,
        context: &str,
        allocation_keys: &[String],
        service: &str,
        component: Option<&str>,
    ) -> Self {
        let context_name_with_keys = if allocation_keys.is_empty() {
            context.to_string()
        } else {
            format!("{context}{KEY_SEPARATOR}{}", allocation_keys.join(KEY_SEPARATOR))
        };
        Self {
            cluster_name: cluster.unwrap_or(UNRESOLVED_NAME).to_string(),
            contract_name: contract.to_string(),
            context_name: context.to_string(),
            context_name_with_keys,
            service_name: service.to_string(),
            component_name: component.unwrap_or(ROOT_COMPONENT_NAME).to_string(),
        }
    }

    /// Returns a copy addressing a different component of the same service.
    #[must_use]
    pub fn with_component(&self, component: &str) -> Self {
        Self {
            component_name: component.to_string(),
            ..self.clone()
        }
    }

    /// Returns true for service-level keys.
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.component_name == ROOT_COMPONENT_NAME
    }

    /// Returns true for component-level keys.
    #[must_use]
    pub fn is_component(&self) -> bool {
        !self.is_service()
    }

    /// Returns the key of the enclosing service instance.
    #[must_use]
    pub fn parent_service_key(&self) -> Self {
        if self.is_service() { self.clone() } else { self.with_component(ROOT_COMPONENT_NAME) }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn key(&self) -> String {
        [
            self.cluster_name.as_str(),
            self.contract_name.as_str(),
            self.context_name_with_keys.as_str(),
            self.service_name.as_str(),
            self.component_name.as_str(),
        ]
        .join(KEY_SEPARATOR)
    }

    /// Returns the cluster-safe deploy name: `a-` plus the 64-bit FNV-1a hash
    /// of the key in lowercase hex.
    #[must_use]
    pub fn deploy_name(&self) -> String {
        format!("a-{:016x}", fnv1a_64(self.key().as_bytes()))
    }

    /// Returns the decimal 32-bit FNV-1a hash of the key.
    #[must_use]
    pub fn instance_id(&self) -> String {
        fnv1a_32(self.key().as_bytes()).to_string()
    }
}

impl fmt::Display for ComponentInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Returns true when the key string addresses a service-level instance.
#[must_use]
pub fn is_service_key(key: &str) -> bool {
    key.rsplit(KEY_SEPARATOR).next() == Some(ROOT_COMPONENT_NAME)
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Computes the 64-bit FNV-1a hash of `bytes`.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV64_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV64_PRIME)
    })
}

/// Computes the 32-bit FNV-1a hash of `bytes`.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV32_PRIME)
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
