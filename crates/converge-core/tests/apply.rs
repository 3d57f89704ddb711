// converge-core/tests/apply.rs
// ============================================================================
// Module: Apply Tests
// Description: Execution of diff plans against recording plugins.
// Purpose: Validate plugin calls, actual state updates, and failure handling.
// Dependencies: converge-core
// ============================================================================
//! ## Overview
//! Runs diff plans through the [`Applier`] with a recording deploy plugin
//! and the in-memory actual state store, then re-diffs to confirm the actual
//! state converged.

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

use converge_core::Action;
use converge_core::ActionContext;
use converge_core::Applier;
use converge_core::ApplyError;
use converge_core::EventLog;
use converge_core::ExternalData;
use converge_core::InMemoryActualStateStore;
use converge_core::InMemorySecretLoader;
use converge_core::Level;
use converge_core::Policy;
use converge_core::PolicyResolution;
use converge_core::ResolutionDiff;
use converge_core::Timestamp;
use support::RecordingDeployPlugin;
use support::TestRegistry;
use support::TestResult;
use support::ensure;
use support::fixture_policy;
use support::fixture_users;
use support::resolve;
use support::resolve_fixture;

const T1: Timestamp = Timestamp::from_unix_millis(1_700_000_000_000);
const T2: Timestamp = Timestamp::from_unix_millis(1_700_000_100_000);

/// Borrowed inputs of one apply run.
struct Run<'a> {
    desired_policy: &'a Policy,
    desired_state: &'a PolicyResolution,
    actual_policy: &'a Policy,
    registry: &'a TestRegistry,
    store: &'a InMemoryActualStateStore,
}

impl Run<'_> {
    /// Applies `actions` to `actual`, returning the outcome and event log.
    fn apply(
        &self,
        actual: &mut PolicyResolution,
        actions: Vec<Action>,
        now: Timestamp,
    ) -> (Result<usize, ApplyError>, EventLog) {
        let external = ExternalData {
            users: Box::new(fixture_users()),
            secrets: Box::new(InMemorySecretLoader::new()),
        };
        let mut event_log = EventLog::new();
        let ctx = ActionContext {
            desired_policy: self.desired_policy,
            desired_state: self.desired_state,
            actual_policy: self.actual_policy,
            actual_state: actual,
            state_updater: self.store,
            external_data: &external,
            plugins: self.registry,
            event_log: &mut event_log,
            now,
        };
        let result = Applier::new(ctx, actions).apply();
        (result, event_log)
    }
}

#[test]
fn applying_first_plan_converges_actual_state() -> TestResult {
    let policy = fixture_policy();
    let mut desired = resolve_fixture();
    let diff = ResolutionDiff::new(&mut desired, &PolicyResolution::new(), T1);
    let registry = TestRegistry::default();
    let store = InMemoryActualStateStore::new();
    let run = Run {
        desired_policy: &policy,
        desired_state: &desired,
        actual_policy: &policy,
        registry: &registry,
        store: &store,
    };

    let mut actual = PolicyResolution::new();
    let (result, log) = run.apply(&mut actual, diff.actions.clone(), T1);
    ensure(result? == diff.actions.len(), "every action succeeded")?;
    ensure(!log.has_errors(), "no errors recorded")?;

    let calls = registry.deploy.calls.borrow();
    ensure(calls.len() == 4, format!("one create per code component: {calls:?}"))?;
    ensure(calls.iter().all(|call| call.starts_with("create a-")), "only creates")?;
    ensure(
        calls.iter().filter(|call| call.ends_with("cluster-us-west")).count() == 2,
        "bob's instances land in the west cluster",
    )?;
    ensure(*registry.post_process.runs.borrow() == 1, "post-process ran once")?;
    ensure(store.keys()?.len() == desired.len(), "store mirrors actual state")?;

    let kafka = actual
        .instance("cluster-us-west#kafka#prod-low#kafka#kafka")
        .ok_or("bob kafka component missing")?;
    let expected = format!("https://{}.cluster-us-west", kafka.key.deploy_name());
    ensure(
        kafka.endpoints.get("url") == Some(&expected),
        format!("endpoints recorded: {:?}", kafka.endpoints),
    )?;
    let edge = actual
        .instance("cluster-us-west#kafka#prod-low#kafka#zookeeper")
        .ok_or("edge component missing")?;
    ensure(edge.endpoints.is_empty(), "components without code have no endpoints")?;

    let mut again = resolve_fixture();
    let rediff = ResolutionDiff::new(&mut again, &actual, T2);
    ensure(!rediff.has_changes(), format!("actual state converged: {rediff:?}"))
}

#[test]
fn failed_actions_are_logged_and_the_rest_still_apply() -> TestResult {
    let policy = fixture_policy();
    let mut desired = resolve_fixture();
    let diff = ResolutionDiff::new(&mut desired, &PolicyResolution::new(), T1);
    let failing = desired
        .instance("cluster-us-east#kafka#test#Alice#kafka#kafka")
        .ok_or("alice kafka component missing")?
        .key
        .deploy_name();
    let registry = TestRegistry {
        deploy: RecordingDeployPlugin {
            fail_on: vec![failing],
            ..RecordingDeployPlugin::default()
        },
        ..TestRegistry::default()
    };
    let store = InMemoryActualStateStore::new();
    let run = Run {
        desired_policy: &policy,
        desired_state: &desired,
        actual_policy: &policy,
        registry: &registry,
        store: &store,
    };

    let mut actual = PolicyResolution::new();
    let (result, log) = run.apply(&mut actual, diff.actions.clone(), T1);
    ensure(
        result
            == Err(ApplyError::Failed {
                failed: 1,
                total: diff.actions.len(),
            }),
        "exactly one action failed",
    )?;
    ensure(log.count_at(Level::Error) == 1, "failure recorded once")?;
    ensure(registry.deploy.calls.borrow().len() == 3, "other creates went through")?;
    ensure(actual.len() == desired.len() - 1, "failed instance is absent from actual state")?;

    let mut again = resolve_fixture();
    let rediff = ResolutionDiff::new(&mut again, &actual, T2);
    ensure(rediff.component_instantiate.len() == 1, "the failed instance is retried next run")
}

#[test]
fn deleting_everything_destroys_through_the_actual_policy() -> TestResult {
    let policy = fixture_policy();
    let mut desired = resolve_fixture();
    let diff = ResolutionDiff::new(&mut desired, &PolicyResolution::new(), T1);
    let registry = TestRegistry::default();
    let store = InMemoryActualStateStore::new();
    let mut actual = PolicyResolution::new();
    let run = Run {
        desired_policy: &policy,
        desired_state: &desired,
        actual_policy: &policy,
        registry: &registry,
        store: &store,
    };
    let (result, _) = run.apply(&mut actual, diff.actions, T1);
    result?;

    let empty_policy = Policy {
        dependencies: Vec::new(),
        ..Policy::default()
    };
    let mut nothing = resolve(&empty_policy)?.resolution;
    let teardown = ResolutionDiff::new(&mut nothing, &actual, T2);
    let run = Run {
        desired_policy: &empty_policy,
        desired_state: &nothing,
        actual_policy: &policy,
        registry: &registry,
        store: &store,
    };
    let (result, log) = run.apply(&mut actual, teardown.actions, T2);
    result?;
    ensure(!log.has_errors(), "teardown is clean")?;
    ensure(actual.is_empty(), "actual state is empty")?;
    ensure(store.keys()?.is_empty(), "store is empty")?;
    let destroys =
        registry.deploy.calls.borrow().iter().filter(|call| call.starts_with("destroy")).count();
    ensure(destroys == 4, format!("one destroy per code component, got {destroys}"))
}

#[test]
fn missing_plugin_fails_the_action() -> TestResult {
    let mut policy = fixture_policy();
    for service in policy.services.values_mut() {
        for component in &mut service.components {
            if let Some(code) = component.code.as_mut() {
                code.code_type = "helm".to_string();
            }
        }
    }
    let mut desired = resolve(&policy)?.resolution;
    let diff = ResolutionDiff::new(&mut desired, &PolicyResolution::new(), T1);
    let registry = TestRegistry::default();
    let store = InMemoryActualStateStore::new();
    let run = Run {
        desired_policy: &policy,
        desired_state: &desired,
        actual_policy: &policy,
        registry: &registry,
        store: &store,
    };
    let mut actual = PolicyResolution::new();
    let (result, log) = run.apply(&mut actual, diff.actions, T1);
    ensure(
        matches!(result, Err(ApplyError::Failed { failed: 4, .. })),
        format!("unexpected result: {result:?}"),
    )?;
    let needle = "can't find deploy plugin for codeType: helm";
    ensure(
        log.iter().any(|event| event.message.contains(needle)),
        "missing plugin is reported",
    )
}
