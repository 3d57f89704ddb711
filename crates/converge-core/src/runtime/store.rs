// converge-core/src/runtime/store.rs
// ============================================================================
// Module: Converge In-Memory Collaborators
// Description: In-memory user directory, secret store, and actual state store.
// Purpose: Provide deterministic collaborators without external backends.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory implementations of [`UserLoader`], [`SecretLoader`], and
//! [`ActualStateUpdater`] for tests and local runs. They are not intended
//! for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::ComponentInstance;
use crate::core::User;
use crate::interfaces::ActualStateUpdater;
use crate::interfaces::SecretLoader;
use crate::interfaces::StateUpdateError;
use crate::interfaces::UserLoader;
use crate::interfaces::UserLoaderError;

// ============================================================================
// SECTION: Users and Secrets
// ============================================================================

/// In-memory user directory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserLoader {
    /// Users by id.
    users: BTreeMap<String, User>,
}

impl InMemoryUserLoader {
    /// Creates a directory holding `users`. Later duplicates replace earlier
    /// ones.
    #[must_use]
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id.clone(), user)).collect(),
        }
    }
}

impl UserLoader for InMemoryUserLoader {
    fn load_user_by_id(&self, id: &str) -> Result<Option<User>, UserLoaderError> {
        Ok(self.users.get(id).cloned())
    }

    fn load_users_all(&self) -> Result<Vec<User>, UserLoaderError> {
        Ok(self.users.values().cloned().collect())
    }
}

/// In-memory secret store.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretLoader {
    /// Secrets by user id.
    secrets: BTreeMap<String, BTreeMap<String, String>>,
}

impl InMemorySecretLoader {
    /// Creates an empty secret store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret for `user_id`.
    #[must_use]
    pub fn with_secret(
        mut self,
        user_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.secrets.entry(user_id.into()).or_default().insert(name.into(), value.into());
        self
    }
}

impl SecretLoader for InMemorySecretLoader {
    fn load_secrets_by_user_id(
        &self,
        id: &str,
    ) -> Result<BTreeMap<String, String>, UserLoaderError> {
        Ok(self.secrets.get(id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Actual State
// ============================================================================

/// In-memory actual state store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryActualStateStore {
    /// Instances by key, protected by a mutex.
    instances: Arc<Mutex<BTreeMap<String, ComponentInstance>>>,
}

impl InMemoryActualStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns the stored instance for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateUpdateError`] when the store lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<ComponentInstance>, StateUpdateError> {
        let guard = self.instances.lock().map_err(|_| poisoned())?;
        Ok(guard.get(key).cloned())
    }

    /// Returns every stored key in order.
    ///
    /// # Errors
    ///
    /// Returns [`StateUpdateError`] when the store lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>, StateUpdateError> {
        let guard = self.instances.lock().map_err(|_| poisoned())?;
        Ok(guard.keys().cloned().collect())
    }

    /// Stores `instance` under its key.
    fn put(&self, instance: &ComponentInstance) -> Result<(), StateUpdateError> {
        self.instances
            .lock()
            .map_err(|_| poisoned())?
            .insert(instance.key_string(), instance.clone());
        Ok(())
    }
}

impl ActualStateUpdater for InMemoryActualStateStore {
    fn create(&self, instance: &ComponentInstance) -> Result<(), StateUpdateError> {
        self.put(instance)
    }

    fn update(&self, instance: &ComponentInstance) -> Result<(), StateUpdateError> {
        self.put(instance)
    }

    fn delete(&self, key: &str) -> Result<(), StateUpdateError> {
        self.instances.lock().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

/// Error for a poisoned store lock.
fn poisoned() -> StateUpdateError {
    StateUpdateError::Store("actual state store mutex poisoned".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;
    use crate::core::ComponentInstanceKey;

    #[test]
    fn actual_state_store_tracks_writes() {
        let store = InMemoryActualStateStore::new();
        let key = ComponentInstanceKey::new(Some("c1"), "svc", "ctx", &[], "svc", None);
        let instance = ComponentInstance::new(key.clone());
        store.create(&instance).unwrap();
        assert_eq!(store.keys().unwrap(), vec![key.key()]);
        store.delete(&key.key()).unwrap();
        assert!(store.get(&key.key()).unwrap().is_none());
    }

    #[test]
    fn secrets_default_to_empty() {
        let secrets = InMemorySecretLoader::new().with_secret("alice", "token", "s3cr3t");
        assert_eq!(secrets.load_secrets_by_user_id("alice").unwrap().len(), 1);
        assert!(secrets.load_secrets_by_user_id("bob").unwrap().is_empty());
    }
}
