//! Registry of supervised components for one session.
//!
//! The registry owns one slot per [`ComponentKind`], answers dependency
//! readiness queries from supervising threads, and turns every state change
//! into a [`StackSnapshot`] delivered to the configured [`StateObserver`].

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::component::{
    Component, RuntimeContext, StartError, StartOutcome, StopOutcome, SupervisedComponent,
};
use crate::kind::{ComponentKind, ComponentState, HealthStatus};
use crate::observer::{REGISTRY_TARGET, StackSnapshot, StateObserver};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors raised while assembling a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A component of this kind is already registered.
    #[error("a {kind} component is already registered")]
    DuplicateComponent {
        /// Kind that was registered twice.
        kind: ComponentKind,
    },
}

/// State shared between the registry handle and supervising threads.
pub(crate) struct RegistryShared {
    runtime: RuntimeContext,
    observer: Box<dyn StateObserver>,
    slots: RwLock<Vec<Arc<SupervisedComponent>>>,
    notify: Mutex<()>,
}

impl RegistryShared {
    pub(crate) fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    fn components(&self) -> Vec<Arc<SupervisedComponent>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, kind: ComponentKind) -> Option<Arc<SupervisedComponent>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|component| component.kind() == kind)
            .cloned()
    }

    /// Whether every registered kind in `kinds` is healthy. Kinds absent from
    /// this session count as satisfied.
    pub(crate) fn is_ready(&self, kinds: &[ComponentKind]) -> bool {
        self.pending(kinds).is_empty()
    }

    /// Kinds from `kinds` that are registered but not healthy.
    pub(crate) fn pending(&self, kinds: &[ComponentKind]) -> Vec<ComponentKind> {
        kinds
            .iter()
            .copied()
            .filter(|kind| {
                self.find(*kind)
                    .is_some_and(|component| component.health() != HealthStatus::Healthy)
            })
            .collect()
    }

    pub(crate) fn snapshot(&self) -> StackSnapshot {
        let entries: Vec<_> = self
            .components()
            .iter()
            .map(|component| (component.kind(), component.health(), component.was_attempted()))
            .collect();
        let summary: Vec<_> = entries
            .iter()
            .map(|(_, status, attempted)| (*status, *attempted))
            .collect();
        StackSnapshot {
            state: aggregate_state(&summary),
            components: entries
                .into_iter()
                .map(|(kind, status, _)| (kind, status))
                .collect(),
        }
    }

    /// Delivers a fresh snapshot, then stops every launched component whose
    /// dependencies are no longer healthy.
    pub(crate) fn notify_state_change(&self) {
        {
            let _serialised = self.notify.lock().unwrap_or_else(PoisonError::into_inner);
            let snapshot = self.snapshot();
            debug!(
                target: REGISTRY_TARGET,
                state = %snapshot.state,
                "delivering stack snapshot"
            );
            self.observer.state_changed(&snapshot);
        }
        for component in self.components() {
            component.stop_if_dependencies_lost(self);
        }
    }

    /// Republishes after a refused start. With nothing running the aggregate
    /// stays stopped, so nothing is published.
    pub(crate) fn notify_start_failure(&self) {
        let running = self
            .components()
            .iter()
            .any(|component| component.state() != ComponentState::Stopped);
        if running {
            self.notify_state_change();
        }
    }
}

/// Derives the stack state from `(health, attempted)` pairs.
///
/// Rules apply in order: everything stopped (including an empty registry)
/// is stopped; everything healthy is healthy; any unhealthy component, or any
/// attempted component that failed to start or stopped while others still
/// run, is unhealthy; anything else is starting.
#[must_use]
pub fn aggregate_state(entries: &[(HealthStatus, bool)]) -> HealthStatus {
    if entries.iter().all(|(status, _)| *status == HealthStatus::Stopped) {
        return HealthStatus::Stopped;
    }
    if entries.iter().all(|(status, _)| *status == HealthStatus::Healthy) {
        return HealthStatus::Healthy;
    }
    let degraded = entries.iter().any(|(status, attempted)| {
        *status == HealthStatus::Unhealthy || (*status == HealthStatus::Stopped && *attempted)
    });
    if degraded {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Starting
    }
}

/// Handle to the components of one session.
///
/// Cloning the handle shares the same registry.
#[derive(Clone)]
pub struct ComponentRegistry {
    shared: Arc<RegistryShared>,
}

impl ComponentRegistry {
    /// Builds an empty registry.
    pub fn new(runtime: RuntimeContext, observer: impl StateObserver + 'static) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                runtime,
                observer: Box::new(observer),
                slots: RwLock::new(Vec::new()),
                notify: Mutex::new(()),
            }),
        }
    }

    /// Adds `component` under its kind.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateComponent`] when the kind already has
    /// a slot.
    pub fn register(
        &self,
        component: impl Component,
    ) -> Result<Arc<SupervisedComponent>, RegistryError> {
        self.register_boxed(Box::new(component))
    }

    /// Adds an already boxed component under its kind.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateComponent`] when the kind already has
    /// a slot.
    pub fn register_boxed(
        &self,
        component: Box<dyn Component>,
    ) -> Result<Arc<SupervisedComponent>, RegistryError> {
        let mut slots = self
            .shared
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let kind = component.kind();
        if slots.iter().any(|existing| existing.kind() == kind) {
            return Err(RegistryError::DuplicateComponent { kind });
        }
        let supervised = SupervisedComponent::from_boxed(component);
        supervised.wire(Arc::downgrade(&self.shared));
        slots.push(Arc::clone(&supervised));
        debug!(target: REGISTRY_TARGET, component = %kind, "component registered");
        Ok(supervised)
    }

    /// Shared collaborators.
    #[must_use]
    pub fn runtime(&self) -> &RuntimeContext {
        self.shared.runtime()
    }

    /// Registered kinds in registration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ComponentKind> {
        self.shared
            .components()
            .iter()
            .map(|component| component.kind())
            .collect()
    }

    /// The component registered under `kind`.
    #[must_use]
    pub fn component(&self, kind: ComponentKind) -> Option<Arc<SupervisedComponent>> {
        self.shared.find(kind)
    }

    /// Lifecycle state of `kind`, when registered.
    #[must_use]
    pub fn component_state(&self, kind: ComponentKind) -> Option<ComponentState> {
        self.shared.find(kind).map(|component| component.state())
    }

    /// Health of `kind`, when registered.
    #[must_use]
    pub fn component_health(&self, kind: ComponentKind) -> Option<HealthStatus> {
        self.shared.find(kind).map(|component| component.health())
    }

    /// Whether every registered kind in `kinds` is healthy.
    ///
    /// Kinds that are not part of this session count as satisfied.
    #[must_use]
    pub fn is_ready(&self, kinds: &[ComponentKind]) -> bool {
        self.shared.is_ready(kinds)
    }

    /// Current aggregate and per-component health.
    #[must_use]
    pub fn snapshot(&self) -> StackSnapshot {
        self.shared.snapshot()
    }

    /// Recomputes the snapshot and hands it to the observer.
    pub fn notify_state_change(&self) {
        self.shared.notify_state_change();
    }

    /// Starts the component registered under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::Unregistered`] when nothing is registered under
    /// `kind`, or the error from [`SupervisedComponent::start`].
    pub fn start(&self, kind: ComponentKind) -> Result<StartOutcome, StartError> {
        self.shared
            .find(kind)
            .ok_or(StartError::Unregistered { kind })?
            .start()
    }

    /// Stops the component registered under `kind`.
    pub fn stop(&self, kind: ComponentKind) -> StopOutcome {
        self.shared
            .find(kind)
            .map_or(StopOutcome::AlreadyStopped, |component| component.stop())
    }

    /// Starts every component in registration order.
    ///
    /// Failures are logged and returned; they never prevent the remaining
    /// components from starting.
    #[must_use = "start failures are only logged unless inspected"]
    pub fn start_all(&self) -> Vec<StartError> {
        let mut failures = Vec::new();
        for component in self.shared.components() {
            if let Err(error) = component.start() {
                warn!(
                    target: REGISTRY_TARGET,
                    component = %component.kind(),
                    error = %error,
                    "component failed to start"
                );
                failures.push(error);
            }
        }
        failures
    }

    /// Stops every component, dependents first.
    pub fn stop_all(&self) {
        info!(target: REGISTRY_TARGET, "stopping all components");
        for component in self.shared.components().iter().rev() {
            component.stop();
        }
    }

    /// Waits until every component is stopped or `timeout` elapses.
    ///
    /// Returns `true` when everything stopped in time.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let running: Vec<_> = self
                .shared
                .components()
                .iter()
                .filter(|component| component.state() != ComponentState::Stopped)
                .map(|component| component.kind())
                .collect();
            if running.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    target: REGISTRY_TARGET,
                    ?running,
                    "components still running after shutdown timeout"
                );
                return false;
            }
            thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ComponentRegistry")
            .field("runtime", self.runtime())
            .field("kinds", &self.kinds())
            .finish_non_exhaustive()
    }
}
