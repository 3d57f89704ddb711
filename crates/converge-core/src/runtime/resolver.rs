// converge-core/src/runtime/resolver.rs
// ============================================================================
// Module: Policy Resolver
// Description: Recursive resolution of dependencies into component instances.
// Purpose: Turn the declarative policy into the desired-state resolution.
// Dependencies: converge-lang, serde_json, thiserror, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`PolicyResolver`] walks every dependency in declaration order. Each
//! dependency is resolved into its own local [`PolicyResolution`]; only when
//! the whole tree resolves is the local data merged into the global result,
//! which is where conflicting parameters between dependencies surface.
//!
//! Failures come in two tiers:
//! - Unresolvable requests (unknown user, no matching context, vetoed by a
//!   rule, unresolved sub-service) leave the dependency unresolved and the
//!   run continues.
//! - Critical errors (malformed policy) abort the run with a
//!   [`ResolveError`]. Each critical error is recorded in the event log
//!   exactly once as it travels up the recursion.
//!
//! Recursion state travels down in a [`TraversalContext`] value; each call
//! returns its own event log fragment which the caller appends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use converge_lang::CriteriaError;
use converge_lang::ExpressionCache;
use converge_lang::ExpressionParams;
use converge_lang::LABEL_CLUSTER;
use converge_lang::LabelSet;
use converge_lang::ParameterError;
use converge_lang::TemplateCache;
use converge_lang::TemplateError;
use converge_lang::TemplateParams;
use converge_lang::escape_name;
use serde_json::Map;
use serde_json::Value as JsonValue;
use serde_json::json;
use thiserror::Error;

use crate::core::ComponentInstanceKey;
use crate::core::ConflictError;
use crate::core::Context;
use crate::core::Dependency;
use crate::core::EventLog;
use crate::core::Policy;
use crate::core::PolicyError;
use crate::core::PolicyResolution;
use crate::core::RuleError;
use crate::core::RuleOutcome;
use crate::core::Service;
use crate::core::ServiceComponent;
use crate::core::User;
use crate::interfaces::SecretLoader;
use crate::interfaces::UserLoader;
use crate::interfaces::UserLoaderError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Resolver limits and logging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum accepted expression size in bytes.
    pub max_expression_bytes: usize,
    /// Maximum accepted template size in bytes.
    pub max_template_bytes: usize,
    /// Maximum service nesting depth.
    pub max_resolution_depth: usize,
    /// Record calculated code and discovery params as debug events.
    pub log_calculated_params: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_expression_bytes: converge_lang::expression::DEFAULT_MAX_EXPRESSION_BYTES,
            max_template_bytes: converge_lang::template::DEFAULT_MAX_TEMPLATE_BYTES,
            max_resolution_depth: 64,
            log_calculated_params: true,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Critical resolution failures.
#[derive(Debug, Error)]
pub enum ResolveErrorKind {
    /// Policy failed structural validation.
    #[error("policy validation failed: {0}")]
    InvalidPolicy(PolicyError),
    /// User or secret directory failed.
    #[error("{0}")]
    Directory(UserLoaderError),
    /// Dependency names a service missing from the policy.
    #[error("dependency '{dependency}' refers to non-existing service: {service}")]
    ServiceNotFound {
        /// Dependency id.
        dependency: String,
        /// Missing service name.
        service: String,
    },
    /// Service owner is not a known user.
    #[error("service '{service}' refers to non-existing owner: {owner}")]
    OwnerNotFound {
        /// Service name.
        service: String,
        /// Missing owner id.
        owner: String,
    },
    /// Context criteria failed to evaluate.
    #[error(
        "error while trying to match context '{context}' for contract '{service}': {source}"
    )]
    ContextMatch {
        /// Context name.
        context: String,
        /// Service name.
        service: String,
        /// Criteria failure.
        source: CriteriaError,
    },
    /// Global rule failed to evaluate.
    #[error("{0}")]
    Rule(RuleError),
    /// Allocation key template failed.
    #[error(
        "error while resolving allocation keys for contract '{service}', context '{context}': \
         {source}"
    )]
    AllocationKey {
        /// Service name.
        service: String,
        /// Context name.
        context: String,
        /// Template failure.
        source: TemplateError,
    },
    /// Label `cluster` names a cluster missing from the policy.
    #[error("cluster '{0}' doesn't exist in policy")]
    ClusterNotFound(String),
    /// Service instance reached itself through its own components.
    #[error("error when processing policy, service cycle detected: {0}")]
    ServiceCycle(String),
    /// Component ordering failed.
    #[error("{0}")]
    ComponentOrder(PolicyError),
    /// Code params failed to evaluate.
    #[error(
        "error when processing code params for service '{service}', component '{component}': \
         {source}"
    )]
    CodeParams {
        /// Service name.
        service: String,
        /// Component name.
        component: String,
        /// Parameter failure.
        source: ParameterError,
    },
    /// Discovery params failed to evaluate.
    #[error(
        "error when processing discovery params for service '{service}', component \
         '{component}': {source}"
    )]
    DiscoveryParams {
        /// Service name.
        service: String,
        /// Component name.
        component: String,
        /// Parameter failure.
        source: ParameterError,
    },
    /// Two paths produced different parameters for one instance.
    #[error("{0}")]
    Conflict(ConflictError),
    /// Service nesting exceeded the configured depth.
    #[error("dependency '{dependency}' exceeds maximum resolution depth {limit}")]
    DepthExceeded {
        /// Dependency id.
        dependency: String,
        /// Configured limit.
        limit: usize,
    },
}

/// Critical error that aborts resolution.
///
/// # Invariants
/// - `logged` flips to true once the error has been recorded in an event log.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ResolveError {
    /// Failure detail.
    kind: ResolveErrorKind,
    /// Whether the error has been recorded.
    logged: bool,
}

impl ResolveError {
    /// Wraps a failure that has not been logged yet.
    #[must_use]
    pub const fn new(kind: ResolveErrorKind) -> Self {
        Self {
            kind,
            logged: false,
        }
    }

    /// Returns the failure detail.
    #[must_use]
    pub const fn kind(&self) -> &ResolveErrorKind {
        &self.kind
    }

    /// Returns true once the error has been recorded in an event log.
    #[must_use]
    pub const fn is_logged(&self) -> bool {
        self.logged
    }

    /// Records the error into `log` unless it was recorded before.
    fn log_once(mut self, log: &mut EventLog) -> Self {
        if !self.logged {
            log.error(self.kind.to_string());
            self.logged = true;
        }
        self
    }
}

impl From<ResolveErrorKind> for ResolveError {
    fn from(kind: ResolveErrorKind) -> Self {
        Self::new(kind)
    }
}

// ============================================================================
// SECTION: Traversal
// ============================================================================

/// State carried down one resolution path.
#[derive(Debug, Clone)]
pub struct TraversalContext<'a> {
    /// Dependency being resolved.
    pub dependency: &'a Dependency,
    /// Requesting user.
    pub user: &'a User,
    /// Requesting user's secrets.
    pub secrets: &'a BTreeMap<String, String>,
    /// Service to resolve at this level.
    pub service_name: String,
    /// Working labels.
    pub labels: LabelSet,
    /// Service keys already visited on this path.
    pub path: Vec<String>,
    /// Key of the component that led here.
    pub arrival_key: Option<ComponentInstanceKey>,
    /// Nesting depth, zero at the top level.
    pub depth: usize,
}

impl<'a> TraversalContext<'a> {
    /// Creates the top-level context for `dependency`.
    #[must_use]
    pub fn root(
        dependency: &'a Dependency,
        user: &'a User,
        secrets: &'a BTreeMap<String, String>,
        labels: LabelSet,
    ) -> Self {
        Self {
            dependency,
            user,
            secrets,
            service_name: dependency.service.clone(),
            labels,
            path: Vec::new(),
            arrival_key: None,
            depth: 0,
        }
    }

    /// Creates the context for a component that depends on another service.
    #[must_use]
    pub fn child(
        &self,
        service_name: &str,
        labels: LabelSet,
        arrival: ComponentInstanceKey,
    ) -> Self {
        Self {
            dependency: self.dependency,
            user: self.user,
            secrets: self.secrets,
            service_name: service_name.to_string(),
            labels,
            path: self.path.clone(),
            arrival_key: Some(arrival),
            depth: self.depth + 1,
        }
    }

    /// Template parameters exposing `User` and `Labels`.
    fn template_params(&self, labels: &LabelSet) -> TemplateParams {
        TemplateParams::new()
            .with_user(&self.user.id, &self.user.name, &self.user.labels, self.secrets)
            .with_labels(labels)
    }
}

/// Result of resolving one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The service resolved to this service-level key.
    Resolved(ComponentInstanceKey),
    /// The request cannot be fulfilled; not an error.
    Unresolved,
}

/// Outcome of a node plus the events it recorded.
struct NodeReport {
    /// Node outcome.
    outcome: Result<NodeOutcome, ResolveError>,
    /// Event log fragment.
    event_log: EventLog,
}

/// Resolution output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutput {
    /// Desired state.
    pub resolution: PolicyResolution,
    /// Events recorded while resolving.
    pub event_log: EventLog,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves every dependency of a policy.
pub struct PolicyResolver<'a, U: ?Sized, S: ?Sized> {
    /// Policy to resolve.
    policy: &'a Policy,
    /// User directory.
    users: &'a U,
    /// Secret store.
    secrets: &'a S,
    /// Resolver settings.
    config: ResolverConfig,
    /// Compiled expressions for this resolver.
    expressions: ExpressionCache,
    /// Compiled templates for this resolver.
    templates: TemplateCache,
}

impl<'a, U, S> PolicyResolver<'a, U, S>
where
    U: UserLoader + ?Sized,
    S: SecretLoader + ?Sized,
{
    /// Creates a resolver with caches sized by `config`.
    #[must_use]
    pub fn new(policy: &'a Policy, users: &'a U, secrets: &'a S, config: ResolverConfig) -> Self {
        Self {
            policy,
            users,
            secrets,
            config,
            expressions: ExpressionCache::with_limit(config.max_expression_bytes),
            templates: TemplateCache::with_limit(config.max_template_bytes),
        }
    }

    /// Resolves every dependency into the desired state.
    ///
    /// Unresolvable dependencies are left out of the result. On a critical
    /// error the collected events are emitted to `tracing` before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the policy is malformed.
    pub fn resolve_all_dependencies(&self) -> Result<ResolutionOutput, ResolveError> {
        let mut event_log = EventLog::new();
        if let Err(err) = self.policy.validate() {
            let err =
                ResolveError::new(ResolveErrorKind::InvalidPolicy(err)).log_once(&mut event_log);
            event_log.emit();
            return Err(err);
        }

        let mut resolution = PolicyResolution::new();
        resolution.policy_summary = self.policy.summary();
        let mut resolved = 0_usize;
        for dependency in &self.policy.dependencies {
            let report = self.resolve_dependency(dependency, &mut resolution);
            event_log.append(report.event_log);
            match report.outcome {
                Ok(NodeOutcome::Resolved(_)) => resolved += 1,
                Ok(NodeOutcome::Unresolved) => {}
                Err(err) => {
                    event_log.emit();
                    return Err(err);
                }
            }
        }

        if self.config.log_calculated_params {
            log_calculated_params(&resolution, &mut event_log);
        }
        event_log
            .info("Policy resolution finished")
            .field("dependencies", self.policy.dependencies.len())
            .field("resolved", resolved)
            .field("instances", resolution.len())
            .field("expression_cache", self.expressions.len())
            .field("template_cache", self.templates.len());
        Ok(ResolutionOutput {
            resolution,
            event_log,
        })
    }

    /// Resolves one top-level dependency and merges it into `global`.
    fn resolve_dependency(
        &self,
        dependency: &Dependency,
        global: &mut PolicyResolution,
    ) -> NodeReport {
        let mut log = EventLog::new();
        log.info(format!(
            "Resolving top-level dependency '{}' ('{}' -> '{}')",
            dependency.id, dependency.user_id, dependency.service
        ));
        let outcome = self.resolve_dependency_inner(dependency, global, &mut log);
        NodeReport {
            outcome: outcome.map_err(|err| err.log_once(&mut log)),
            event_log: log,
        }
    }

    /// Body of [`Self::resolve_dependency`].
    fn resolve_dependency_inner(
        &self,
        dependency: &Dependency,
        global: &mut PolicyResolution,
        log: &mut EventLog,
    ) -> Result<NodeOutcome, ResolveError> {
        let Some(user) = self
            .users
            .load_user_by_id(&dependency.user_id)
            .map_err(ResolveErrorKind::Directory)?
        else {
            log.warn(format!(
                "dependency '{}' refers to non-existing user: {}",
                dependency.id, dependency.user_id
            ));
            return Ok(NodeOutcome::Unresolved);
        };
        let mut secrets = user.secrets.clone();
        secrets.extend(
            self.secrets
                .load_secrets_by_user_id(&user.id)
                .map_err(ResolveErrorKind::Directory)?,
        );
        let labels = LabelSet::new(user.labels.clone())
            .add_labels(&LabelSet::new(dependency.labels.clone()))
            .add_secrets(&secrets);
        log.info(format!(
            "Labels (initial): {} and {} secrets",
            render_labels(&labels),
            labels.secret_count()
        ));

        let ctx = TraversalContext::root(dependency, &user, &secrets, labels);
        let mut local = PolicyResolution::new();
        let report = self.resolve_node(ctx, &mut local);
        log.append(report.event_log);
        let outcome = report.outcome?;
        if let NodeOutcome::Resolved(service_key) = &outcome {
            global.append_data(&local).map_err(ResolveErrorKind::Conflict)?;
            global.record_dependency(&dependency.id, service_key);
            log.info(format!(
                "Successfully resolved dependency '{}' ('{}' -> '{}'): {}",
                dependency.id, user.name, dependency.service, service_key
            ));
        }
        Ok(outcome)
    }

    /// Resolves one service node, returning its outcome and log fragment.
    fn resolve_node(
        &self,
        ctx: TraversalContext<'_>,
        resolution: &mut PolicyResolution,
    ) -> NodeReport {
        let mut log = EventLog::new();
        let outcome = self.resolve_node_inner(ctx, resolution, &mut log);
        NodeReport {
            outcome: outcome.map_err(|err| err.log_once(&mut log)),
            event_log: log,
        }
    }

    /// Body of [`Self::resolve_node`].
    fn resolve_node_inner(
        &self,
        mut ctx: TraversalContext<'_>,
        resolution: &mut PolicyResolution,
        log: &mut EventLog,
    ) -> Result<NodeOutcome, ResolveError> {
        let dependency = ctx.dependency;
        if ctx.depth > self.config.max_resolution_depth {
            return Err(ResolveErrorKind::DepthExceeded {
                dependency: dependency.id.clone(),
                limit: self.config.max_resolution_depth,
            }
            .into());
        }
        log.info(format!(
            "Resolving dependency '{}' ('{}' -> '{}'): processing '{}', tree depth {}",
            dependency.id, dependency.user_id, dependency.service, ctx.service_name, ctx.depth
        ));

        let service = self.policy.service(&ctx.service_name).ok_or_else(|| {
            ResolveErrorKind::ServiceNotFound {
                dependency: dependency.id.clone(),
                service: ctx.service_name.clone(),
            }
        })?;
        log.debug(format!("Service found in policy: '{}'", service.name));
        let owner =
            self.users.load_user_by_id(&service.owner).map_err(ResolveErrorKind::Directory)?;
        if owner.is_none() {
            return Err(ResolveErrorKind::OwnerNotFound {
                service: service.name.clone(),
                owner: service.owner.clone(),
            }
            .into());
        }

        let labels = ctx.labels.apply_transform(&service.change_labels);
        let Some((context, rules)) = self.match_context(&ctx, service, &labels, log)? else {
            log.warn(format!(
                "unable to find matching context within contract: '{}'",
                service.name
            ));
            log.warn(format!("Cannot resolve instance: contract '{}'", service.name));
            return Ok(NodeOutcome::Unresolved);
        };
        let labels = rules.labels;

        let allocation_keys =
            self.resolve_allocation_keys(&ctx, service, context, &labels, log)?;
        let cluster = match labels.get(LABEL_CLUSTER) {
            Some(name) if self.policy.cluster(name).is_none() => {
                return Err(ResolveErrorKind::ClusterNotFound(name.to_string()).into());
            }
            other => other,
        };
        let service_key = ComponentInstanceKey::new(
            cluster,
            &service.name,
            &context.name,
            &allocation_keys,
            &service.name,
            None,
        );

        let service_key_text = service_key.key();
        let cycle = ctx.path.contains(&service_key_text);
        ctx.path.push(service_key_text);
        if cycle {
            return Err(ResolveErrorKind::ServiceCycle(ctx.path.join(" -> ")).into());
        }

        resolution.record_labels(&service_key, &labels);
        if let Some(arrival) = &ctx.arrival_key {
            resolution.store_edge(arrival, &service_key);
        }

        let components = service.sorted_components().map_err(ResolveErrorKind::ComponentOrder)?;
        let mut discovery_tree = Map::new();
        for component in components {
            let component_key = service_key.with_component(&component.name);
            let outcome = self.resolve_component(
                &ctx,
                service,
                component,
                &component_key,
                &labels,
                &mut discovery_tree,
                resolution,
                log,
            )?;
            if outcome == NodeOutcome::Unresolved {
                log.warn(format!(
                    "Cannot resolve instance: contract '{}', service '{}', component '{}'",
                    ctx.service_name, service.name, component.name
                ));
                return Ok(NodeOutcome::Unresolved);
            }
            resolution
                .get_component_instance_entry(&component_key)
                .add_rule_information(rules.allows_ingress);
            resolution.record_resolved(&component_key, &dependency.id);
            log.info(format!(
                "Successfully resolved component instance '{}' -> '{}' (component '{}'): {}",
                ctx.user.name, service.name, component.name, component_key
            ));
        }

        resolution
            .get_component_instance_entry(&service_key)
            .add_rule_information(rules.allows_ingress);
        resolution.record_resolved(&service_key, &dependency.id);
        log.info(format!(
            "Successfully resolved service instance '{}' -> '{}': {}",
            ctx.user.name, service.name, service_key
        ));
        Ok(NodeOutcome::Resolved(service_key))
    }

    /// Picks the first context whose criteria match and no rule forbids.
    fn match_context<'s>(
        &self,
        ctx: &TraversalContext<'_>,
        service: &'s Service,
        labels: &LabelSet,
        log: &mut EventLog,
    ) -> Result<Option<(&'s Context, RuleOutcome)>, ResolveError> {
        let names: Vec<&str> =
            service.contexts.iter().map(|context| context.name.as_str()).collect();
        log.info(format!(
            "Picking context within contract '{}'. Trying contexts: [{}]",
            service.name,
            names.join(", ")
        ));
        let objects = expression_objects(ctx.user, service, labels);
        let params = ExpressionParams::new(labels, objects.clone());
        for context in &service.contexts {
            let matched = context.criteria.allows(&params, &self.expressions).map_err(|source| {
                ResolveErrorKind::ContextMatch {
                    context: context.name.clone(),
                    service: service.name.clone(),
                    source,
                }
            })?;
            log.debug(format!(
                "Trying context '{}' within contract '{}'. Matched = {matched}",
                context.name, service.name
            ));
            if !matched {
                continue;
            }
            let context_labels = labels.apply_transform(&context.change_labels);
            let rule_params = ExpressionParams::new(&context_labels, objects.clone());
            let outcome = self
                .policy
                .evaluate_rules(&context_labels, &rule_params, &self.expressions)
                .map_err(ResolveErrorKind::Rule)?;
            if let Some(rule) = &outcome.forbidden_by {
                log.info(format!(
                    "Context '{}' within contract '{}' forbidden by rule '{rule}'",
                    context.name, service.name
                ));
                continue;
            }
            log.info(format!(
                "Found matching context within contract '{}': {}",
                service.name, context.name
            ));
            return Ok(Some((context, outcome)));
        }
        Ok(None)
    }

    /// Renders allocation key templates for the matched context.
    fn resolve_allocation_keys(
        &self,
        ctx: &TraversalContext<'_>,
        service: &Service,
        context: &Context,
        labels: &LabelSet,
        log: &mut EventLog,
    ) -> Result<Vec<String>, ResolveError> {
        let Some(allocation) = &context.allocation else {
            return Ok(Vec::new());
        };
        let params = ctx.template_params(labels);
        let mut keys = Vec::with_capacity(allocation.keys.len());
        for template in &allocation.keys {
            let rendered = self.templates.render(template, &params).map_err(|source| {
                ResolveErrorKind::AllocationKey {
                    service: service.name.clone(),
                    context: context.name.clone(),
                    source,
                }
            })?;
            keys.push(escape_name(&rendered));
        }
        if !keys.is_empty() {
            log.debug(format!(
                "Allocation keys for contract '{}', context '{}': [{}]",
                service.name,
                context.name,
                keys.join(", ")
            ));
        }
        Ok(keys)
    }

    /// Resolves one component of a service.
    #[allow(
        clippy::too_many_arguments,
        reason = "Component resolution threads node state explicitly."
    )]
    fn resolve_component(
        &self,
        ctx: &TraversalContext<'_>,
        service: &Service,
        component: &ServiceComponent,
        component_key: &ComponentInstanceKey,
        labels: &LabelSet,
        discovery_tree: &mut Map<String, JsonValue>,
        resolution: &mut PolicyResolution,
        log: &mut EventLog,
    ) -> Result<NodeOutcome, ResolveError> {
        let service_key = component_key.parent_service_key();
        resolution.store_edge(&service_key, component_key);
        let component_labels = labels.apply_transform(&component.change_labels);
        resolution.record_labels(component_key, &component_labels);

        let params = ctx
            .template_params(&component_labels)
            .with_discovery(discovery_view(discovery_tree, component_key));
        let discovery =
            component.discovery.evaluate(&self.templates, &params).map_err(|source| {
                ResolveErrorKind::DiscoveryParams {
                    service: service.name.clone(),
                    component: component.name.clone(),
                    source,
                }
            })?;
        let mut published = match discovery.to_json() {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        let instance = escape_name(&component_key.deploy_name());
        published.insert("instance".to_string(), JsonValue::String(instance));
        discovery_tree.insert(component.name.clone(), JsonValue::Object(published));
        resolution
            .record_discovery_params(component_key, discovery)
            .map_err(ResolveErrorKind::Conflict)?;

        if let Some(code) = &component.code {
            log.info(format!(
                "Processing dependency on component with code: {} ({})",
                component.name, code.code_type
            ));
            let params = ctx
                .template_params(&component_labels)
                .with_discovery(discovery_view(discovery_tree, component_key));
            let code_params = code.params.evaluate(&self.templates, &params).map_err(|source| {
                ResolveErrorKind::CodeParams {
                    service: service.name.clone(),
                    component: component.name.clone(),
                    source,
                }
            })?;
            resolution
                .record_code_params(component_key, code_params)
                .map_err(ResolveErrorKind::Conflict)?;
            return Ok(NodeOutcome::Resolved(component_key.clone()));
        }

        let Some(child_service) = &component.service else {
            return Ok(NodeOutcome::Resolved(component_key.clone()));
        };
        log.info(format!("Processing dependency on another contract: {child_service}"));
        let child = ctx.child(child_service, component_labels, component_key.clone());
        let report = self.resolve_node(child, resolution);
        log.append(report.event_log);
        match report.outcome? {
            NodeOutcome::Resolved(_) => Ok(NodeOutcome::Resolved(component_key.clone())),
            NodeOutcome::Unresolved => Ok(NodeOutcome::Unresolved),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Objects exposed to context criteria and rule expressions.
fn expression_objects(
    user: &User,
    service: &Service,
    labels: &LabelSet,
) -> BTreeMap<String, JsonValue> {
    let mut objects = BTreeMap::new();
    objects.insert(
        "service".to_string(),
        json!({
            "Name": service.name,
            "Owner": service.owner,
            "Labels": labels.labels,
        }),
    );
    objects.insert(
        "user".to_string(),
        json!({
            "ID": user.id,
            "Name": user.name,
            "Labels": user.labels,
        }),
    );
    objects
}

/// Discovery namespace visible to templates of `key`.
fn discovery_view(tree: &Map<String, JsonValue>, key: &ComponentInstanceKey) -> JsonValue {
    let mut view = tree.clone();
    view.insert("instance".to_string(), JsonValue::String(escape_name(&key.deploy_name())));
    view.insert("instanceId".to_string(), JsonValue::String(key.instance_id()));
    if key.is_component() {
        let service_key = key.parent_service_key();
        view.insert(
            "service".to_string(),
            json!({
                "instance": escape_name(&service_key.deploy_name()),
                "instanceId": service_key.instance_id(),
            }),
        );
    }
    JsonValue::Object(view)
}

/// Renders labels as `{k=v, ...}` with secret values hidden.
fn render_labels(labels: &LabelSet) -> String {
    let pairs: Vec<String> = labels
        .iter()
        .filter(|(key, _)| !labels.secrets.contains(*key))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Records calculated component parameters as debug events.
fn log_calculated_params(resolution: &PolicyResolution, log: &mut EventLog) {
    for instance in resolution.component_instance_map.values() {
        if !instance.key.is_component() {
            continue;
        }
        log.debug(format!(
            "Calculated final code params for component '{}': {}",
            instance.key, instance.calculated_code_params
        ));
        log.debug(format!(
            "Calculated final discovery params for component '{}': {}",
            instance.key, instance.calculated_discovery
        ));
    }
}
