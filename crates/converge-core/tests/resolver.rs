// converge-core/tests/resolver.rs
// ============================================================================
// Module: Resolver Tests
// Description: End-to-end resolution of the kafka/zookeeper fixture policy.
// Purpose: Validate context matching, sharing, rules, and failure tiers.
// Dependencies: converge-core, converge-lang
// ============================================================================
//! ## Overview
//! Resolves the fixture policy and checks instance identities, consumer
//! sets, edges, parameters, and the two failure tiers: unresolvable
//! dependencies are skipped while malformed policies abort the run.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod support;

use std::collections::BTreeSet;

use converge_core::ALLOW_INGRESS;
use converge_core::Code;
use converge_core::Context;
use converge_core::Dependency;
use converge_core::InMemorySecretLoader;
use converge_core::Level;
use converge_core::PolicyError;
use converge_core::PolicyResolver;
use converge_core::ResolveErrorKind;
use converge_core::ResolverConfig;
use converge_core::Service;
use converge_core::ServiceComponent;
use converge_lang::Criteria;
use converge_lang::ParameterTree;
use converge_lang::TemplateError;
use support::TestResult;
use support::ensure;
use support::fixture_policy;
use support::fixture_users;
use support::resolve;
use support::resolve_fixture;

const ALICE_KAFKA: &str = "cluster-us-east#kafka#test#Alice#kafka#root";
const BOB_KAFKA: &str = "cluster-us-west#kafka#prod-low#kafka#root";
const TEST_ZOOKEEPER: &str = "cluster-us-east#zookeeper#test#zookeeper#root";
const PROD_ZOOKEEPER: &str = "cluster-us-west#zookeeper#prod#zookeeper#root";

fn dependency_ids(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| (*id).to_string()).collect()
}

#[test]
fn fixture_resolves_one_instance_per_exercised_context() -> TestResult {
    let resolution = resolve_fixture();
    ensure(resolution.len() == 10, format!("expected 10 instances, got {}", resolution.len()))?;

    let alice = resolution.instance(ALICE_KAFKA).ok_or("alice kafka missing")?;
    ensure(alice.dependency_ids == dependency_ids(&["alice_kafka"]), "alice kafka consumers")?;
    let bob = resolution.instance(BOB_KAFKA).ok_or("bob kafka missing")?;
    ensure(bob.dependency_ids == dependency_ids(&["bob_kafka"]), "bob kafka consumers")?;

    let shared = resolution.instance(PROD_ZOOKEEPER).ok_or("prod zookeeper missing")?;
    ensure(
        shared.dependency_ids == dependency_ids(&["bob_kafka", "bob_zookeeper"]),
        "prod zookeeper is shared by both of bob's dependencies",
    )?;
    let test = resolution.instance(TEST_ZOOKEEPER).ok_or("test zookeeper missing")?;
    ensure(test.dependency_ids == dependency_ids(&["alice_kafka"]), "test zookeeper consumers")
}

#[test]
fn dependency_flags_reflect_resolution() -> TestResult {
    let mut policy = fixture_policy();
    let resolution = resolve(&policy)?.resolution;
    policy.apply_resolution(&resolution);
    let flags: Vec<(&str, bool)> =
        policy.dependencies.iter().map(|dep| (dep.id.as_str(), dep.resolved)).collect();
    ensure(
        flags
            == vec![
                ("alice_kafka", true),
                ("bob_kafka", true),
                ("carol_kafka", false),
                ("bob_zookeeper", true),
                ("dave_kafka", false),
            ],
        format!("unexpected resolution flags: {flags:?}"),
    )?;
    let alice = policy.dependencies.first().ok_or("no dependencies")?;
    ensure(alice.service_key.as_deref() == Some(ALICE_KAFKA), "alice service key recorded")
}

#[test]
fn edges_link_components_and_sub_services() -> TestResult {
    let resolution = resolve_fixture();
    let component = "cluster-us-east#kafka#test#Alice#kafka#zookeeper";
    let service = resolution.instance(ALICE_KAFKA).ok_or("alice kafka missing")?;
    ensure(service.edges_out.contains(component), "service points at its component")?;
    let edge = resolution.instance(component).ok_or("edge component missing")?;
    ensure(edge.edges_out.contains(TEST_ZOOKEEPER), "component points at sub-service")?;
    let zookeeper = resolution.instance(TEST_ZOOKEEPER).ok_or("test zookeeper missing")?;
    ensure(zookeeper.edges_in.contains(component), "sub-service records the incoming edge")
}

#[test]
fn code_params_are_rendered_with_discovery_and_labels() -> TestResult {
    let resolution = resolve_fixture();
    let kafka = resolution
        .instance("cluster-us-west#kafka#prod-low#kafka#kafka")
        .ok_or("bob kafka component missing")?;
    let params = &kafka.calculated_code_params;
    ensure(params.get_str("cluster") == Some("cluster-us-west"), "cluster param")?;
    let edge = resolution
        .instance("cluster-us-west#kafka#prod-low#kafka#zookeeper")
        .ok_or("edge component missing")?;
    ensure(
        params.get_str("zookeeper") == Some(edge.key.deploy_name().as_str()),
        format!("zookeeper param: {params}"),
    )?;

    let zookeeper = resolution
        .instance("cluster-us-west#zookeeper#prod#zookeeper#zookeeper")
        .ok_or("zookeeper component missing")?;
    let expected = format!("zk-{}:2181", zookeeper.key.deploy_name());
    ensure(
        zookeeper.calculated_discovery.get_str("url") == Some(expected.as_str()),
        "discovery url",
    )
}

#[test]
fn ingress_rule_marks_test_instances() -> TestResult {
    let resolution = resolve_fixture();
    let alice = resolution.instance(ALICE_KAFKA).ok_or("alice kafka missing")?;
    ensure(
        alice.data_for_plugins.get(ALLOW_INGRESS).map(String::as_str) == Some("false"),
        "test instances block ingress",
    )?;
    let bob = resolution.instance(BOB_KAFKA).ok_or("bob kafka missing")?;
    ensure(
        bob.data_for_plugins.get(ALLOW_INGRESS).map(String::as_str) == Some("true"),
        "prod instances allow ingress",
    )
}

#[test]
fn unresolvable_dependencies_are_logged_not_fatal() -> TestResult {
    let mut policy = fixture_policy();
    policy.dependencies.push(Dependency {
        id: "ghost_kafka".to_string(),
        user_id: "404".to_string(),
        service: "kafka".to_string(),
        ..Dependency::default()
    });
    let output = resolve(&policy)?;
    ensure(!output.resolution.is_resolved("ghost_kafka"), "ghost stays unresolved")?;
    ensure(!output.event_log.has_errors(), "no error events")?;
    let messages: Vec<&str> =
        output.event_log.iter().map(|event| event.message.as_str()).collect();
    ensure(
        messages.contains(&"dependency 'ghost_kafka' refers to non-existing user: 404"),
        "missing user warning",
    )?;
    ensure(
        messages.iter().any(|message| message.contains("forbidden by rule 'forbid_blocked_users'")),
        "rule veto is logged",
    )?;
    ensure(output.event_log.count_at(Level::Warn) >= 3, "warnings for each unresolved dependency")
}

#[test]
fn component_cycle_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    policy.add_service(Service {
        name: "loop".to_string(),
        owner: "0".to_string(),
        components: vec![
            ServiceComponent {
                name: "a".to_string(),
                service: Some("zookeeper".to_string()),
                dependencies: vec!["b".to_string()],
                ..ServiceComponent::default()
            },
            ServiceComponent {
                name: "b".to_string(),
                service: Some("zookeeper".to_string()),
                dependencies: vec!["a".to_string()],
                ..ServiceComponent::default()
            },
        ],
        ..Service::default()
    });
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(err.kind(), ResolveErrorKind::InvalidPolicy(PolicyError::ComponentCycle { .. })),
        format!("unexpected error: {err}"),
    )?;
    ensure(err.is_logged(), "critical errors are logged")?;
    ensure(err.to_string().contains("a -> b -> a"), format!("cycle path missing: {err}"))
}

#[test]
fn service_instance_cycle_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    let mut recursive = policy.service("zookeeper").ok_or("zookeeper missing")?.clone();
    recursive.components.push(ServiceComponent {
        name: "again".to_string(),
        service: Some("zookeeper".to_string()),
        ..ServiceComponent::default()
    });
    policy.add_service(recursive);
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(err.kind(), ResolveErrorKind::ServiceCycle(_)),
        format!("unexpected error: {err}"),
    )?;
    ensure(err.to_string().contains("service cycle detected"), "cycle message")
}

#[test]
fn conflicting_code_params_are_critical() -> TestResult {
    let mut policy = fixture_policy();
    let zookeeper = policy.services.get_mut("zookeeper").ok_or("zookeeper missing")?;
    let component = zookeeper.components.first_mut().ok_or("component missing")?;
    let params: ParameterTree = [("owner", "{{ .User.Name }}")].into_iter().collect();
    component.code = Some(Code {
        code_type: "noop".to_string(),
        params,
    });
    policy.dependencies.push(Dependency {
        id: "carol_zookeeper".to_string(),
        user_id: "3".to_string(),
        service: "zookeeper".to_string(),
        ..Dependency::default()
    });

    let err = resolve(&policy).unwrap_err();
    let message = err.to_string();
    ensure(matches!(err.kind(), ResolveErrorKind::Conflict(_)), format!("unexpected: {message}"))?;
    ensure(
        message.contains("Bob") && message.contains("Carol"),
        format!("both values reported: {message}"),
    )
}

#[test]
fn unknown_service_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    policy.dependencies.push(Dependency {
        id: "bob_missing".to_string(),
        user_id: "2".to_string(),
        service: "missing".to_string(),
        ..Dependency::default()
    });
    let err = resolve(&policy).unwrap_err();
    ensure(
        err.to_string() == "dependency 'bob_missing' refers to non-existing service: missing",
        format!("unexpected error: {err}"),
    )
}

#[test]
fn depth_limit_is_enforced() -> TestResult {
    let policy = fixture_policy();
    let users = fixture_users();
    let secrets = InMemorySecretLoader::new();
    let config = ResolverConfig {
        max_resolution_depth: 0,
        ..ResolverConfig::default()
    };
    let err = PolicyResolver::new(&policy, &users, &secrets, config)
        .resolve_all_dependencies()
        .unwrap_err();
    ensure(
        matches!(err.kind(), ResolveErrorKind::DepthExceeded { limit: 0, .. }),
        format!("unexpected error: {err}"),
    )
}

#[test]
fn secrets_count_toward_labels_without_leaking() -> TestResult {
    let policy = fixture_policy();
    let users = fixture_users();
    let secrets = InMemorySecretLoader::new().with_secret("1", "token", "s3cr3t");
    let output = PolicyResolver::new(&policy, &users, &secrets, ResolverConfig::default())
        .resolve_all_dependencies()?;
    let rendered: Vec<&str> = output.event_log.iter().map(|event| event.message.as_str()).collect();
    ensure(rendered.iter().any(|message| message.contains("and 1 secrets")), "secret count")?;
    ensure(rendered.iter().all(|message| !message.contains("s3cr3t")), "secret value hidden")
}

#[test]
fn vetoed_context_falls_through_to_the_next_match() -> TestResult {
    let mut policy = fixture_policy();
    let fallback: Context = serde_yaml::from_str(
        r#"
name: fallback
criteria:
  require_all: ["blocked == true"]
change_labels:
  set: { cluster: cluster-us-west, blocked: "false" }
"#,
    )?;
    policy.services.get_mut("kafka").ok_or("kafka missing")?.contexts.push(fallback);
    let mut resolved = policy.clone();
    let resolution = resolve(&policy)?.resolution;
    resolved.apply_resolution(&resolution);
    let dave = resolved
        .dependencies
        .iter()
        .find(|dependency| dependency.id == "dave_kafka")
        .ok_or("dave missing")?;
    ensure(dave.resolved, "dave resolves through the fallback context")?;
    ensure(
        dave.service_key.as_deref() == Some("cluster-us-west#kafka#fallback#kafka#root"),
        format!("unexpected service key: {:?}", dave.service_key),
    )
}

#[test]
fn component_named_root_is_rejected() -> TestResult {
    let mut policy = fixture_policy();
    let zookeeper = policy.services.get_mut("zookeeper").ok_or("zookeeper missing")?;
    zookeeper.components.first_mut().ok_or("component missing")?.name = "root".to_string();
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(
            err.kind(),
            ResolveErrorKind::InvalidPolicy(PolicyError::ReservedComponentName { .. })
        ),
        format!("unexpected error: {err}"),
    )
}

#[test]
fn separator_in_context_name_is_rejected() -> TestResult {
    let mut policy = fixture_policy();
    let kafka = policy.services.get_mut("kafka").ok_or("kafka missing")?;
    kafka.contexts.first_mut().ok_or("context missing")?.name = "test#1".to_string();
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(
            err.kind(),
            ResolveErrorKind::InvalidPolicy(PolicyError::SeparatorInName {
                kind: "context",
                ..
            })
        ),
        format!("unexpected error: {err}"),
    )
}

#[test]
fn allocation_key_with_missing_field_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    let kafka = policy.services.get_mut("kafka").ok_or("kafka missing")?;
    let test = kafka.contexts.first_mut().ok_or("context missing")?;
    test.allocation.as_mut().ok_or("allocation missing")?.keys =
        vec!["{{ .User.Labels.team }}".to_string()];
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(
            err.kind(),
            ResolveErrorKind::AllocationKey {
                source: TemplateError::MissingField { .. },
                ..
            }
        ),
        format!("unexpected error: {err}"),
    )?;
    ensure(err.is_logged(), "critical errors are logged")
}

#[test]
fn unknown_service_owner_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    policy.services.get_mut("zookeeper").ok_or("zookeeper missing")?.owner = "404".to_string();
    let err = resolve(&policy).unwrap_err();
    ensure(
        err.to_string() == "service 'zookeeper' refers to non-existing owner: 404",
        format!("unexpected error: {err}"),
    )
}

#[test]
fn cluster_label_naming_unknown_cluster_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    policy.clusters.remove("cluster-us-east");
    let err = resolve(&policy).unwrap_err();
    ensure(
        matches!(err.kind(), ResolveErrorKind::ClusterNotFound(name) if name == "cluster-us-east"),
        format!("unexpected error: {err}"),
    )
}

#[test]
fn malformed_context_criteria_is_critical() -> TestResult {
    let mut policy = fixture_policy();
    let kafka = policy.services.get_mut("kafka").ok_or("kafka missing")?;
    kafka.contexts.first_mut().ok_or("context missing")?.criteria =
        Criteria::require_all(["test =="]);
    let err = resolve(&policy).unwrap_err();
    match err.kind() {
        ResolveErrorKind::ContextMatch {
            context,
            service,
            source,
        } => {
            ensure(context == "test" && service == "kafka", format!("wrong context: {err}"))?;
            ensure(source.is_compile_error(), format!("expected a compile error: {err}"))
        }
        other => Err(format!("unexpected error: {other}").into()),
    }
}
