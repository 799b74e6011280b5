//! Behavioural tests for component supervision and dependency gating.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{LifecycleEvent, ScriptedComponent, StackHarness, wait_until};
use crate::component::StartError;
use crate::kind::{ComponentKind, HealthStatus};

const SETTLE: Duration = Duration::from_millis(300);
const TIMEOUT: Duration = Duration::from_secs(5);

type StepResult = Result<(), String>;

#[derive(Default)]
struct LifecycleWorld {
    harness: StackHarness,
    start_errors: Vec<StartError>,
}

#[fixture]
fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::default())
}

fn parse_kind(value: &str) -> Result<ComponentKind, String> {
    value
        .trim_matches('"')
        .parse()
        .map_err(|error: crate::kind::ComponentKindParseError| error.to_string())
}

#[given("the dependency wait gives up after {checks} checks")]
fn given_retry_budget(world: &RefCell<LifecycleWorld>, checks: String) -> StepResult {
    let checks = checks
        .trim_matches('"')
        .parse()
        .map_err(|error: std::num::ParseIntError| error.to_string())?;
    world.borrow_mut().harness.set_ready_retries(checks);
    Ok(())
}

#[given("a {kind} component that reports ready immediately")]
fn given_ready_component(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    world
        .borrow_mut()
        .harness
        .add(ScriptedComponent::ready_immediately(kind));
    Ok(())
}

#[given("a {kind} component that reports ready once released")]
fn given_gated_component(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    let mut world = world.borrow_mut();
    let gate = world.harness.gate(kind);
    world.harness.add(ScriptedComponent::ready_when(kind, &gate));
    Ok(())
}

#[given("a {kind} component that never reports ready")]
fn given_silent_component(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    world
        .borrow_mut()
        .harness
        .add(ScriptedComponent::never_ready(kind));
    Ok(())
}

#[given("a {kind} component whose preparation fails")]
fn given_failing_component(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    world
        .borrow_mut()
        .harness
        .add(ScriptedComponent::failing_prepare(kind));
    Ok(())
}

#[given("a {kind} component that depends on {dependency}")]
fn given_dependent(
    world: &RefCell<LifecycleWorld>,
    kind: String,
    dependency: String,
) -> StepResult {
    let kind = parse_kind(&kind)?;
    let dependency = parse_kind(&dependency)?;
    world
        .borrow_mut()
        .harness
        .add(ScriptedComponent::ready_immediately(kind).after(dependency));
    Ok(())
}

#[when("the {kind} component is started")]
fn when_started(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    let mut world = world.borrow_mut();
    if let Err(error) = world.harness.registry().start(kind) {
        world.start_errors.push(error);
    }
    Ok(())
}

#[when("every component is started")]
fn when_all_started(world: &RefCell<LifecycleWorld>) {
    let mut world = world.borrow_mut();
    let failures = world.harness.registry().start_all();
    world.start_errors.extend(failures);
}

#[when("the {kind} component is released")]
fn when_released(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    world.borrow().harness.release(kind);
    Ok(())
}

#[when("the {kind} component is stopped")]
fn when_stopped(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    world.borrow_mut().harness.registry().stop(kind);
    Ok(())
}

#[then("the {kind} component becomes ready")]
fn then_ready(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    if world
        .borrow_mut()
        .harness
        .wait_for_health(kind, HealthStatus::Healthy)
    {
        Ok(())
    } else {
        Err(format!("{kind} never became ready"))
    }
}

#[then("the {kind} component is still starting")]
fn then_still_starting(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    std::thread::sleep(SETTLE);
    let mut world = world.borrow_mut();
    let health = world.harness.registry().component_health(kind);
    if health != Some(HealthStatus::Starting) {
        return Err(format!("expected {kind} to be starting, found {health:?}"));
    }
    let events = world.harness.reporter.events();
    if events.contains(&LifecycleEvent::Ready(kind)) {
        return Err(format!("{kind} reported ready too early: {events:?}"));
    }
    Ok(())
}

#[then("the {kind} component ends up stopped")]
fn then_stopped(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    if world
        .borrow_mut()
        .harness
        .wait_for_health(kind, HealthStatus::Stopped)
    {
        Ok(())
    } else {
        Err(format!("{kind} is still running"))
    }
}

#[then("the {kind} component gives up waiting for {dependency}")]
fn then_gives_up(world: &RefCell<LifecycleWorld>, kind: String, dependency: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    let dependency = parse_kind(&dependency)?;
    let reporter = world.borrow().harness.reporter.clone();
    let expected = LifecycleEvent::DependencyTimeout {
        kind,
        pending: vec![dependency],
    };
    if !wait_until(TIMEOUT, || reporter.count(&expected) == 1) {
        return Err(format!("no dependency timeout recorded: {:?}", reporter.events()));
    }
    if !world
        .borrow_mut()
        .harness
        .wait_for_health(kind, HealthStatus::Stopped)
    {
        return Err(format!("{kind} is still running"));
    }
    if reporter.events().contains(&LifecycleEvent::Ready(kind)) {
        return Err(format!("{kind} ran despite the timeout"));
    }
    Ok(())
}

#[then("the {first} component became ready before the {second} component")]
fn then_ordered(world: &RefCell<LifecycleWorld>, first: String, second: String) -> StepResult {
    let first = parse_kind(&first)?;
    let second = parse_kind(&second)?;
    let reporter = world.borrow().harness.reporter.clone();
    match (
        reporter.position(&LifecycleEvent::Ready(first)),
        reporter.position(&LifecycleEvent::Ready(second)),
    ) {
        (Some(before), Some(after)) if before < after => Ok(()),
        _ => Err(format!("unexpected ready order: {:?}", reporter.events())),
    }
}

#[then("the observer saw {kind} starting before healthy")]
fn then_starting_before_healthy(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    let history = world.borrow().harness.observer.history(kind);
    let starting = history
        .iter()
        .position(|health| *health == Some(HealthStatus::Starting));
    let healthy = history
        .iter()
        .position(|health| *health == Some(HealthStatus::Healthy));
    match (starting, healthy) {
        (Some(before), Some(after)) if before < after => Ok(()),
        _ => Err(format!("unexpected transitions: {history:?}")),
    }
}

#[then("exactly one notification showed {kind} healthy")]
fn then_one_ready_notification(world: &RefCell<LifecycleWorld>, kind: String) -> StepResult {
    let kind = parse_kind(&kind)?;
    let history = world.borrow().harness.observer.history(kind);
    let healthy = history
        .iter()
        .filter(|health| **health == Some(HealthStatus::Healthy))
        .count();
    if healthy == 1 {
        Ok(())
    } else {
        Err(format!("expected one healthy notification, got {history:?}"))
    }
}

#[then("the stack is unhealthy")]
fn then_stack_unhealthy(world: &RefCell<LifecycleWorld>) -> StepResult {
    let observer = world.borrow().harness.observer.clone();
    if wait_until(TIMEOUT, || observer.last_state() == Some(HealthStatus::Unhealthy)) {
        Ok(())
    } else {
        Err(format!("last state was {:?}", observer.last_state()))
    }
}

#[then("the stack is stopped")]
fn then_stack_stopped(world: &RefCell<LifecycleWorld>) -> StepResult {
    let observer = world.borrow().harness.observer.clone();
    if wait_until(TIMEOUT, || observer.last_state() == Some(HealthStatus::Stopped)) {
        Ok(())
    } else {
        Err(format!("last state was {:?}", observer.last_state()))
    }
}

#[then("the start is refused")]
fn then_refused(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.start_errors.as_slice(), [StartError::Prepare { .. }]),
        "expected one preparation error, got {:?}",
        world.start_errors
    );
}

#[then("exactly one preparation failure was reported")]
fn then_one_prepare_failure(world: &RefCell<LifecycleWorld>) {
    let events = world.borrow().harness.reporter.events();
    let failures = events
        .iter()
        .filter(|event| matches!(event, LifecycleEvent::PrepareFailed(_)))
        .count();
    assert_eq!(failures, 1, "events: {events:?}");
}

#[then("no starting notification was published")]
fn then_no_starting(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    let events = world.harness.reporter.events();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, LifecycleEvent::Starting(_))),
        "events: {events:?}"
    );
    assert!(world.harness.observer.snapshots().is_empty());
}

#[scenario(path = "tests/features/component_lifecycle.feature")]
fn component_lifecycle(#[from(world)] _: RefCell<LifecycleWorld>) -> Result<(), String> {
    Ok(())
}
