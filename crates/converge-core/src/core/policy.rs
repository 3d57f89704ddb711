// converge-core/src/core/policy.rs
// ============================================================================
// Module: Policy Model
// Description: Declarative services, contexts, clusters, rules, dependencies.
// Purpose: Define the static policy graph and its fail-closed validation.
// Dependencies: converge-lang, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`Policy`] declares services made of components, the contexts that
//! route a consumer to a service variant, the clusters instances run on,
//! global rules, and the dependencies users hold on services.
//!
//! Components inside a service form a DAG through their `dependencies`
//! lists; [`Service::sorted_components`] returns them dependencies-first
//! and rejects cycles and dangling names.
//!
//! Global rules are evaluated in ascending weight. A matching rule may
//! forbid the dependency (vetoing the context under evaluation), block
//! ingress, or change labels.
//!
//! Security posture: policy documents are operator input; [`Policy::validate`]
//! fails closed on structural problems before any resolution begins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use converge_lang::Criteria;
use converge_lang::CriteriaError;
use converge_lang::ExpressionCache;
use converge_lang::ExpressionParams;
use converge_lang::LabelOperations;
use converge_lang::LabelSet;
use converge_lang::ParameterTree;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::key::KEY_SEPARATOR;
use crate::core::key::ROOT_COMPONENT_NAME;
use crate::core::resolution::PolicyResolution;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural policy errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Two dependencies share an id.
    #[error("duplicate dependency id: {0}")]
    DuplicateDependency(String),
    /// Two rules share a name.
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),
    /// Map key and object name disagree.
    #[error("{kind} `{key}` is declared with name `{name}`")]
    NameMismatch {
        /// Object kind.
        kind: &'static str,
        /// Map key.
        key: String,
        /// Declared name.
        name: String,
    },
    /// Component is neither code nor a service edge, or both.
    #[error(
        "component `{component}` of service `{service}` must have exactly one of code or \
         service"
    )]
    InvalidComponent {
        /// Owning service.
        service: String,
        /// Component name.
        component: String,
    },
    /// Two components of one service share a name.
    #[error("duplicate component `{component}` in service `{service}`")]
    DuplicateComponent {
        /// Owning service.
        service: String,
        /// Component name.
        component: String,
    },
    /// Code component declares an empty code type.
    #[error("component `{component}` of service `{service}` has an empty code type")]
    EmptyCodeType {
        /// Owning service.
        service: String,
        /// Component name.
        component: String,
    },
    /// Component dependency names a component that does not exist.
    #[error(
        "component `{component}` of service `{service}` depends on unknown component \
         `{dependency}`"
    )]
    UnknownComponentDependency {
        /// Owning service.
        service: String,
        /// Component name.
        component: String,
        /// Missing dependency name.
        dependency: String,
    },
    /// Component uses the name reserved for service-level instances.
    #[error("component name `{component}` in service `{service}` is reserved")]
    ReservedComponentName {
        /// Owning service.
        service: String,
        /// Component name.
        component: String,
    },
    /// Name contains the instance key separator.
    #[error("{kind} name `{name}` must not contain `{separator}`", separator = KEY_SEPARATOR)]
    SeparatorInName {
        /// Object kind.
        kind: &'static str,
        /// Offending name.
        name: String,
    },
    /// Component dependencies form a cycle.
    #[error("component cycle detected in service `{service}`: {cycle}")]
    ComponentCycle {
        /// Owning service.
        service: String,
        /// Cycle rendered as `a -> b -> a`.
        cycle: String,
    },
}

// ============================================================================
// SECTION: Users and Dependencies
// ============================================================================

/// A user that may hold dependencies or own services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    /// Stable user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// User labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Secrets attached directly to the user record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
}

/// A user's request for a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    /// Unique dependency id.
    pub id: String,
    /// Requesting user.
    pub user_id: String,
    /// Requested service name.
    pub service: String,
    /// Request labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Whether the last resolution fulfilled this dependency.
    #[serde(default)]
    pub resolved: bool,
    /// Service-level key the dependency resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
}

// ============================================================================
// SECTION: Services
// ============================================================================

/// Context allocation keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Allocation {
    /// Templates rendered against `{User, Labels}` to suffix the context.
    #[serde(default)]
    pub keys: Vec<String>,
}

/// A criteria-gated variant of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Context {
    /// Context name.
    pub name: String,
    /// Matching criteria.
    #[serde(default)]
    pub criteria: Criteria,
    /// Label changes applied after the context matches.
    #[serde(default)]
    pub change_labels: LabelOperations,
    /// Optional allocation keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,
}

/// Deployable code of a leaf component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Code {
    /// Code type selecting the deploy plugin.
    #[serde(rename = "type")]
    pub code_type: String,
    /// Parameter templates.
    #[serde(default)]
    pub params: ParameterTree,
}

/// One component of a service: either code or an edge to another service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceComponent {
    /// Component name, unique within the service.
    pub name: String,
    /// Leaf code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
    /// Service this component depends on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Discovery parameter templates.
    #[serde(default)]
    pub discovery: ParameterTree,
    /// Label changes applied for this component.
    #[serde(default)]
    pub change_labels: LabelOperations,
    /// Sibling components that must resolve first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A service composed of components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Owning user id.
    pub owner: String,
    /// Label changes applied when the service is entered.
    #[serde(default)]
    pub change_labels: LabelOperations,
    /// Contexts in matching order.
    #[serde(default)]
    pub contexts: Vec<Context>,
    /// Components in declaration order.
    #[serde(default)]
    pub components: Vec<ServiceComponent>,
}

/// DFS mark for component sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    InProgress,
    /// Fully emitted.
    Done,
}

/// Depth-first topological sort state for one service.
struct ComponentSorter<'a> {
    /// Service being sorted.
    service: &'a Service,
    /// Components by name.
    index: BTreeMap<&'a str, &'a ServiceComponent>,
    /// Visit marks.
    marks: BTreeMap<&'a str, Mark>,
    /// Current DFS path.
    path: Vec<&'a str>,
    /// Emitted components.
    order: Vec<&'a ServiceComponent>,
}

impl<'a> ComponentSorter<'a> {
    /// Visits `component` and its dependencies.
    fn visit(&mut self, component: &'a ServiceComponent) -> Result<(), PolicyError> {
        let name = component.name.as_str();
        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = self.path.iter().position(|entry| *entry == name).unwrap_or(0);
                let mut cycle: Vec<&str> = self.path[start ..].to_vec();
                cycle.push(name);
                return Err(PolicyError::ComponentCycle {
                    service: self.service.name.clone(),
                    cycle: cycle.join(" -> "),
                });
            }
            None => {}
        }
        self.marks.insert(name, Mark::InProgress);
        self.path.push(name);
        for dependency in &component.dependencies {
            let Some(next) = self.index.get(dependency.as_str()).copied() else {
                return Err(PolicyError::UnknownComponentDependency {
                    service: self.service.name.clone(),
                    component: component.name.clone(),
                    dependency: dependency.clone(),
                });
            };
            self.visit(next)?;
        }
        self.path.pop();
        self.marks.insert(name, Mark::Done);
        self.order.push(component);
        Ok(())
    }
}

impl Service {
    /// Returns the context named `name`.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|context| context.name == name)
    }

    /// Returns the component named `name`.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ServiceComponent> {
        self.components.iter().find(|component| component.name == name)
    }

    /// Returns components ordered so every component follows its
    /// dependencies. Ties keep declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ComponentCycle`] or
    /// [`PolicyError::UnknownComponentDependency`].
    pub fn sorted_components(&self) -> Result<Vec<&ServiceComponent>, PolicyError> {
        let mut sorter = ComponentSorter {
            service: self,
            index: self
                .components
                .iter()
                .map(|component| (component.name.as_str(), component))
                .collect(),
            marks: BTreeMap::new(),
            path: Vec::new(),
            order: Vec::with_capacity(self.components.len()),
        };
        for component in &self.components {
            sorter.visit(component)?;
        }
        Ok(sorter.order)
    }
}

// ============================================================================
// SECTION: Clusters
// ============================================================================

/// A target cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// Cluster type, such as `kubernetes`.
    #[serde(rename = "type")]
    pub cluster_type: String,
    /// Cluster labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Plugin-specific configuration.
    #[serde(default)]
    pub config: ParameterTree,
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Dependency decision of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyAction {
    /// Explicitly allow.
    Allow,
    /// Veto the context under evaluation.
    Forbid,
}

/// Ingress decision of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressAction {
    /// Explicitly allow.
    Allow,
    /// Block external access.
    Block,
}

/// Actions of a matched rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleActions {
    /// Label changes.
    pub change_labels: LabelOperations,
    /// Dependency decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<DependencyAction>,
    /// Ingress decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressAction>,
}

impl RuleActions {
    /// Returns true when the rule forbids the dependency.
    #[must_use]
    pub fn forbids_dependency(&self) -> bool {
        self.dependency == Some(DependencyAction::Forbid)
    }

    /// Returns true when the rule blocks ingress.
    #[must_use]
    pub fn blocks_ingress(&self) -> bool {
        self.ingress == Some(IngressAction::Block)
    }
}

/// A global policy rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Rule name.
    pub name: String,
    /// Evaluation weight; lower runs first.
    #[serde(default)]
    pub weight: i64,
    /// Match criteria. Empty criteria match everything.
    #[serde(default)]
    pub criteria: Criteria,
    /// Actions applied on match.
    #[serde(default)]
    pub actions: RuleActions,
}

/// Combined effect of the rules matching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Labels after every matched rule's label changes.
    pub labels: LabelSet,
    /// First matched rule forbidding the dependency.
    pub forbidden_by: Option<String>,
    /// False when any matched rule blocks ingress.
    pub allows_ingress: bool,
    /// Names of matched rules in evaluation order.
    pub matched: Vec<String>,
}

/// Rule evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error while evaluating rule `{rule}`: {source}")]
pub struct RuleError {
    /// Failing rule.
    pub rule: String,
    /// Criteria failure.
    #[source]
    pub source: CriteriaError,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Object counts of a policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    /// Number of services.
    pub services: usize,
    /// Number of contexts across all services.
    pub contexts: usize,
    /// Number of clusters.
    pub clusters: usize,
    /// Number of rules.
    pub rules: usize,
    /// Number of dependencies.
    pub dependencies: usize,
}

/// The declarative policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Services by name.
    pub services: BTreeMap<String, Service>,
    /// Clusters by name.
    pub clusters: BTreeMap<String, Cluster>,
    /// Global rules in declaration order.
    pub rules: Vec<Rule>,
    /// Dependencies in declaration order.
    pub dependencies: Vec<Dependency>,
}

impl Policy {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a service keyed by its name.
    pub fn add_service(&mut self, service: Service) {
        self.services.insert(service.name.clone(), service);
    }

    /// Inserts a cluster keyed by its name.
    pub fn add_cluster(&mut self, cluster: Cluster) {
        self.clusters.insert(cluster.name.clone(), cluster);
    }

    /// Returns the service named `name`.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Returns the cluster named `name`.
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// Validates structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyError`] found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        ensure_unique_dependency_ids(&self.dependencies)?;
        ensure_unique_rule_names(&self.rules)?;
        for (key, cluster) in &self.clusters {
            ensure_name_matches("cluster", key, &cluster.name)?;
            ensure_key_safe("cluster", &cluster.name)?;
        }
        for (key, service) in &self.services {
            ensure_name_matches("service", key, &service.name)?;
            ensure_key_safe("service", &service.name)?;
            for context in &service.contexts {
                ensure_key_safe("context", &context.name)?;
            }
            ensure_components_well_formed(service)?;
            service.sorted_components()?;
        }
        Ok(())
    }

    /// Returns object counts.
    #[must_use]
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            services: self.services.len(),
            contexts: self.services.values().map(|service| service.contexts.len()).sum(),
            clusters: self.clusters.len(),
            rules: self.rules.len(),
            dependencies: self.dependencies.len(),
        }
    }

    /// Returns rules sorted by ascending weight; ties keep declaration order.
    #[must_use]
    pub fn rules_by_weight(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|rule| rule.weight);
        rules
    }

    /// Evaluates every rule against `params`, applying label changes of
    /// matched rules to `labels` in weight order.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when a rule's criteria fail to evaluate.
    pub fn evaluate_rules(
        &self,
        labels: &LabelSet,
        params: &ExpressionParams,
        cache: &ExpressionCache,
    ) -> Result<RuleOutcome, RuleError> {
        let mut outcome = RuleOutcome {
            labels: labels.clone(),
            forbidden_by: None,
            allows_ingress: true,
            matched: Vec::new(),
        };
        for rule in self.rules_by_weight() {
            let matched = rule.criteria.allows(params, cache).map_err(|source| RuleError {
                rule: rule.name.clone(),
                source,
            })?;
            if !matched {
                continue;
            }
            outcome.matched.push(rule.name.clone());
            outcome.labels = outcome.labels.apply_transform(&rule.actions.change_labels);
            if rule.actions.forbids_dependency() && outcome.forbidden_by.is_none() {
                outcome.forbidden_by = Some(rule.name.clone());
            }
            if rule.actions.blocks_ingress() {
                outcome.allows_ingress = false;
            }
        }
        Ok(outcome)
    }

    /// Returns false when a matching rule blocks ingress.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when a rule's criteria fail to evaluate.
    pub fn allows_ingress(
        &self,
        labels: &LabelSet,
        params: &ExpressionParams,
        cache: &ExpressionCache,
    ) -> Result<bool, RuleError> {
        Ok(self.evaluate_rules(labels, params, cache)?.allows_ingress)
    }

    /// Writes resolution results back onto every dependency.
    pub fn apply_resolution(&mut self, resolution: &PolicyResolution) {
        for dependency in &mut self.dependencies {
            dependency.resolved = resolution.is_resolved(&dependency.id);
            dependency.service_key = resolution.service_key(&dependency.id).map(str::to_string);
        }
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Ensures dependency ids are unique.
fn ensure_unique_dependency_ids(dependencies: &[Dependency]) -> Result<(), PolicyError> {
    let mut seen = BTreeSet::new();
    for dependency in dependencies {
        if !seen.insert(dependency.id.as_str()) {
            return Err(PolicyError::DuplicateDependency(dependency.id.clone()));
        }
    }
    Ok(())
}

/// Ensures rule names are unique.
fn ensure_unique_rule_names(rules: &[Rule]) -> Result<(), PolicyError> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.name.as_str()) {
            return Err(PolicyError::DuplicateRule(rule.name.clone()));
        }
    }
    Ok(())
}

/// Ensures a map key matches the object's declared name.
fn ensure_name_matches(kind: &'static str, key: &str, name: &str) -> Result<(), PolicyError> {
    if key == name {
        return Ok(());
    }
    Err(PolicyError::NameMismatch {
        kind,
        key: key.to_string(),
        name: name.to_string(),
    })
}

/// Ensures `name` can be embedded in an instance key unambiguously.
fn ensure_key_safe(kind: &'static str, name: &str) -> Result<(), PolicyError> {
    if name.contains(KEY_SEPARATOR) {
        return Err(PolicyError::SeparatorInName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Ensures components are unique, well-typed, and non-empty. The root name
/// belongs to the service-level instance and is never a component.
fn ensure_components_well_formed(service: &Service) -> Result<(), PolicyError> {
    let mut seen = BTreeSet::new();
    for component in &service.components {
        ensure_key_safe("component", &component.name)?;
        if component.name == ROOT_COMPONENT_NAME {
            return Err(PolicyError::ReservedComponentName {
                service: service.name.clone(),
                component: component.name.clone(),
            });
        }
        if !seen.insert(component.name.as_str()) {
            return Err(PolicyError::DuplicateComponent {
                service: service.name.clone(),
                component: component.name.clone(),
            });
        }
        match (&component.code, &component.service) {
            (Some(code), None) => {
                if code.code_type.trim().is_empty() {
                    return Err(PolicyError::EmptyCodeType {
                        service: service.name.clone(),
                        component: component.name.clone(),
                    });
                }
            }
            (None, Some(_)) => {}
            _ => {
                return Err(PolicyError::InvalidComponent {
                    service: service.name.clone(),
                    component: component.name.clone(),
                });
            }
        }
    }
    Ok(())
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

    fn code_component(name: &str, dependencies: &[&str]) -> ServiceComponent {
        ServiceComponent {
            name: name.to_string(),
            code: Some(Code {
                code_type: "helm".to_string(),
                params: ParameterTree::new(),
            }),
            dependencies: dependencies.iter().map(|entry| (*entry).to_string()).collect(),
            ..ServiceComponent::default()
        }
    }

    fn service(components: Vec<ServiceComponent>) -> Service {
        Service {
            name: "svc".to_string(),
            owner: "owner".to_string(),
            components,
            ..Service::default()
        }
    }

    #[test]
    fn components_sort_dependencies_first() {
        let service = service(vec![
            code_component("web", &["db", "cache"]),
            code_component("cache", &[]),
            code_component("db", &["cache"]),
        ]);
        let names: Vec<&str> = service
            .sorted_components()
            .unwrap()
            .into_iter()
            .map(|component| component.name.as_str())
            .collect();
        assert_eq!(names, vec!["cache", "db", "web"]);
    }

    #[test]
    fn component_cycle_is_reported_with_path() {
        let service = service(vec![code_component("a", &["b"]), code_component("b", &["a"])]);
        let err = service.sorted_components().unwrap_err();
        assert_eq!(err.to_string(), "component cycle detected in service `svc`: a -> b -> a");
    }

    #[test]
    fn unknown_component_dependency_is_rejected() {
        let service = service(vec![code_component("a", &["missing"])]);
        assert!(matches!(
            service.sorted_components(),
            Err(PolicyError::UnknownComponentDependency { .. })
        ));
    }

    #[test]
    fn validate_rejects_components_with_both_code_and_service() {
        let mut component = code_component("a", &[]);
        component.service = Some("other".to_string());
        let mut policy = Policy::new();
        policy.add_service(service(vec![component]));
        assert!(matches!(policy.validate(), Err(PolicyError::InvalidComponent { .. })));
    }

    #[test]
    fn validate_rejects_reserved_component_name() {
        let mut policy = Policy::new();
        policy.add_service(service(vec![code_component(ROOT_COMPONENT_NAME, &[])]));
        assert_eq!(
            policy.validate(),
            Err(PolicyError::ReservedComponentName {
                service: "svc".to_string(),
                component: "root".to_string(),
            })
        );
    }

    #[test]
    fn validate_rejects_key_separator_in_names() {
        let mut policy = Policy::new();
        policy.add_service(service(vec![code_component("a#b", &[])]));
        let err = policy.validate().unwrap_err();
        assert_eq!(err.to_string(), "component name `a#b` must not contain `#`");

        let mut policy = Policy::new();
        let mut svc = service(vec![code_component("a", &[])]);
        svc.contexts.push(Context {
            name: "prod#1".to_string(),
            ..Context::default()
        });
        policy.add_service(svc);
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::SeparatorInName {
                kind: "context",
                ..
            })
        ));
    }

    #[test]
    fn rules_apply_in_weight_order() {
        let mut policy = Policy::new();
        policy.rules.push(Rule {
            name: "late".to_string(),
            weight: 20,
            actions: RuleActions {
                change_labels: LabelOperations::set_single("tier", "late"),
                ..RuleActions::default()
            },
            ..Rule::default()
        });
        policy.rules.push(Rule {
            name: "early".to_string(),
            weight: 10,
            criteria: Criteria::require_all(["env == 'prod'"]),
            actions: RuleActions {
                change_labels: LabelOperations::set_single("tier", "early"),
                ingress: Some(IngressAction::Block),
                ..RuleActions::default()
            },
        });
        let labels: LabelSet = [("env", "prod")].into_iter().collect();
        let cache = ExpressionCache::new();
        let outcome = policy
            .evaluate_rules(&labels, &ExpressionParams::from_labels(&labels), &cache)
            .unwrap();
        assert_eq!(outcome.matched, vec!["early".to_string(), "late".to_string()]);
        assert_eq!(outcome.labels.get("tier"), Some("late"));
        assert!(!outcome.allows_ingress);
        assert!(outcome.forbidden_by.is_none());
    }
}
