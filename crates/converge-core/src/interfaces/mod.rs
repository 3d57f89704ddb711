// converge-core/src/interfaces/mod.rs
// ============================================================================
// Module: Converge Interfaces
// Description: Contracts for users, secrets, deploy plugins, and state stores.
// Purpose: Keep resolution and apply independent of concrete backends.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces describe every collaborator the engine consumes without
//! embedding backend details: user and secret directories, deploy plugins
//! keyed by code type, post-process plugins that run once per apply, the
//! actual-state persistence hook, and the plugin registry tying them
//! together. Implementations must fail closed: a missing plugin or a store
//! failure is an error, never a silent skip.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use converge_lang::ParameterTree;
use thiserror::Error;

use crate::core::Cluster;
use crate::core::ComponentInstance;
use crate::core::EventLog;
use crate::core::Policy;
use crate::core::PolicyResolution;
use crate::core::User;

// ============================================================================
// SECTION: Users and Secrets
// ============================================================================

/// User and secret directory errors.
#[derive(Debug, Error)]
pub enum UserLoaderError {
    /// User directory reported an error.
    #[error("user loader error: {0}")]
    Load(String),
    /// Secret store reported an error.
    #[error("secret loader error: {0}")]
    Secrets(String),
}

/// Directory of users.
pub trait UserLoader {
    /// Loads a user by id. `Ok(None)` means the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`UserLoaderError`] when the directory cannot be read.
    fn load_user_by_id(&self, id: &str) -> Result<Option<User>, UserLoaderError>;

    /// Loads every known user.
    ///
    /// # Errors
    ///
    /// Returns [`UserLoaderError`] when the directory cannot be read.
    fn load_users_all(&self) -> Result<Vec<User>, UserLoaderError>;
}

/// Store of per-user secrets.
pub trait SecretLoader {
    /// Loads secrets for a user. Unknown users have no secrets.
    ///
    /// # Errors
    ///
    /// Returns [`UserLoaderError::Secrets`] when the store cannot be read.
    fn load_secrets_by_user_id(
        &self,
        id: &str,
    ) -> Result<BTreeMap<String, String>, UserLoaderError>;
}

/// External directories consulted during apply.
pub struct ExternalData {
    /// User directory.
    pub users: Box<dyn UserLoader>,
    /// Secret store.
    pub secrets: Box<dyn SecretLoader>,
}

// ============================================================================
// SECTION: Deploy Plugins
// ============================================================================

/// Deploy plugin errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Plugin reported a failure.
    #[error("deploy plugin error: {0}")]
    Failed(String),
}

/// Deploys component instances of one or more code types.
pub trait DeployPlugin {
    /// Returns the code types this plugin serves.
    fn code_types(&self) -> Vec<String>;

    /// Creates a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the deployment fails.
    fn create(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError>;

    /// Updates a deployment in place.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the update fails.
    fn update(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError>;

    /// Destroys a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the teardown fails.
    fn destroy(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError>;

    /// Returns externally reachable endpoints by name.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when endpoints cannot be listed.
    fn endpoints(
        &self,
        cluster: &Cluster,
        deploy_name: &str,
        params: &ParameterTree,
        event_log: &mut EventLog,
    ) -> Result<BTreeMap<String, String>, DeployError>;
}

/// Runs once after all component actions of an apply.
pub trait PostProcessPlugin {
    /// Plugin name used in logs.
    fn name(&self) -> &str;

    /// Post-processes clusters given the desired policy and both states.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when post-processing fails.
    fn process(
        &self,
        desired_policy: &Policy,
        desired_state: &PolicyResolution,
        actual_state: &PolicyResolution,
        event_log: &mut EventLog,
    ) -> Result<(), DeployError>;
}

// ============================================================================
// SECTION: Plugin Registry
// ============================================================================

/// Plugin registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// No plugin serves the code type.
    #[error("can't find deploy plugin for codeType: {0}")]
    MissingDeployPlugin(String),
    /// The access policy blocks the code type.
    #[error("code type `{0}` is blocked by plugin access policy")]
    Blocked(String),
    /// Two plugins claim the same code type.
    #[error("code type `{0}` is served by more than one deploy plugin")]
    DuplicateCodeType(String),
}

/// Lookup of deploy and post-process plugins.
pub trait PluginRegistry {
    /// Returns the deploy plugin for `code_type`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when no permitted plugin serves the type.
    fn get_deploy_plugin(&self, code_type: &str) -> Result<&dyn DeployPlugin, PluginError>;

    /// Returns every post-process plugin in registration order.
    fn post_process_plugins(&self) -> Vec<&dyn PostProcessPlugin>;
}

// ============================================================================
// SECTION: Actual State Updater
// ============================================================================

/// Actual state persistence errors.
#[derive(Debug, Error)]
pub enum StateUpdateError {
    /// Store reported an error.
    #[error("actual state store error: {0}")]
    Store(String),
}

/// Persists changes to the actual state as actions apply.
pub trait ActualStateUpdater {
    /// Records a newly created instance.
    ///
    /// # Errors
    ///
    /// Returns [`StateUpdateError`] when persistence fails.
    fn create(&self, instance: &ComponentInstance) -> Result<(), StateUpdateError>;

    /// Records a changed instance.
    ///
    /// # Errors
    ///
    /// Returns [`StateUpdateError`] when persistence fails.
    fn update(&self, instance: &ComponentInstance) -> Result<(), StateUpdateError>;

    /// Removes an instance by key.
    ///
    /// # Errors
    ///
    /// Returns [`StateUpdateError`] when persistence fails.
    fn delete(&self, key: &str) -> Result<(), StateUpdateError>;
}
