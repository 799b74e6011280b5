//! Lifecycle state machine wrapped around one component behaviour.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use scionlab_process::CancellationToken;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::context::{PrepareContext, ReadySignal, RunContext};
use super::{Component, PrepareError};
use crate::kind::{ComponentKind, ComponentState, HealthStatus};
use crate::registry::RegistryShared;

/// Log target for component supervision.
pub const COMPONENT_TARGET: &str = "scionlabd::component";

/// Result of a successful [`SupervisedComponent::start`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A supervising thread was spawned.
    Started,
    /// A run was already active; nothing changed.
    AlreadyRunning,
}

/// Result of a [`SupervisedComponent::stop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The active run was asked to stop.
    Stopping,
    /// No run was active; nothing changed.
    AlreadyStopped,
}

/// Reasons a start was refused.
#[derive(Debug, Error)]
pub enum StartError {
    /// The component is not wired to a live registry.
    #[error("component {kind} is not registered")]
    Unregistered {
        /// Refused component.
        kind: ComponentKind,
    },
    /// No SCION binary is configured.
    #[error("no SCION binary configured, cannot start {kind}")]
    MissingBinary {
        /// Refused component.
        kind: ComponentKind,
    },
    /// Staging files failed.
    #[error("failed to prepare {kind}: {source}")]
    Prepare {
        /// Refused component.
        kind: ComponentKind,
        /// Underlying staging error.
        #[source]
        source: PrepareError,
    },
    /// The supervising thread could not be spawned.
    #[error("failed to spawn supervisor for {kind}: {source}")]
    Spawn {
        /// Refused component.
        kind: ComponentKind,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StartError {
    /// Component whose start was refused.
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Unregistered { kind }
            | Self::MissingBinary { kind }
            | Self::Prepare { kind, .. }
            | Self::Spawn { kind, .. } => *kind,
        }
    }
}

struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
    ready: AtomicBool,
    launched: AtomicBool,
}

type Reservation = (Arc<RegistryShared>, Utf8PathBuf, CancellationToken);

/// What occupies a component's run slot.
enum RunSlot {
    Idle,
    /// `prepare` is staging files; the token is handed to the run it starts.
    Preparing(CancellationToken),
    Active(ActiveRun),
}

impl RunSlot {
    fn active(&self, generation: u64) -> Option<&ActiveRun> {
        match self {
            Self::Active(active) if active.generation == generation => Some(active),
            _ => None,
        }
    }
}

/// One component behaviour under lifecycle supervision.
///
/// The component is [`ComponentState::Stopped`] exactly when no supervising
/// thread is alive for it. A live thread is [`ComponentState::Starting`] until
/// its run fires the [`ReadySignal`], and [`ComponentState::Ready`] from then
/// until the thread ends.
pub struct SupervisedComponent {
    kind: ComponentKind,
    behaviour: Box<dyn Component>,
    registry: OnceLock<Weak<RegistryShared>>,
    run: Mutex<RunSlot>,
    generations: AtomicU64,
    attempted: AtomicBool,
}

impl SupervisedComponent {
    /// Wraps `behaviour`. The result cannot start until a registry adopts it.
    pub fn new(behaviour: impl Component) -> Arc<Self> {
        Self::from_boxed(Box::new(behaviour))
    }

    pub(crate) fn from_boxed(behaviour: Box<dyn Component>) -> Arc<Self> {
        Arc::new(Self {
            kind: behaviour.kind(),
            behaviour,
            registry: OnceLock::new(),
            run: Mutex::new(RunSlot::Idle),
            generations: AtomicU64::new(0),
            attempted: AtomicBool::new(false),
        })
    }

    /// Connects the component to its registry. Only the first call wins.
    pub(crate) fn wire(&self, registry: Weak<RegistryShared>) -> bool {
        self.registry.set(registry).is_ok()
    }

    /// Role of the wrapped behaviour.
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Roles that must be healthy before the process launches.
    #[must_use]
    pub fn depends_on(&self) -> &[ComponentKind] {
        self.behaviour.depends_on()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        match &*self.lock_run() {
            RunSlot::Idle | RunSlot::Preparing(_) => ComponentState::Stopped,
            RunSlot::Active(active) if active.ready.load(Ordering::SeqCst) => ComponentState::Ready,
            RunSlot::Active(_) => ComponentState::Starting,
        }
    }

    /// Current coarse health.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        match self.state() {
            ComponentState::Stopped => HealthStatus::Stopped,
            ComponentState::Starting => HealthStatus::Starting,
            state if self.behaviour.is_healthy(state) => HealthStatus::Healthy,
            ComponentState::Ready => HealthStatus::Unhealthy,
        }
    }

    /// Whether a start was requested and not since withdrawn by a stop.
    ///
    /// This stays set when the start failed or the run ended on its own, so
    /// a component that is stopped while others still run makes the stack
    /// unhealthy. It reads false while `prepare` is still staging files.
    #[must_use]
    pub fn was_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
            && !matches!(&*self.lock_run(), RunSlot::Preparing(_))
    }

    /// Stages the component and spawns its supervising thread.
    ///
    /// Calling this while a start is in progress or a run is active has no
    /// effect. Staging runs on the caller's thread without holding the
    /// component's lock.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] when the component is not registered, no SCION
    /// binary is configured, staging fails, or the thread cannot be spawned.
    /// The component stays stopped in every case.
    pub fn start(self: &Arc<Self>) -> Result<StartOutcome, StartError> {
        let kind = self.kind;
        let Some((registry, binary, cancel)) = self.reserve()? else {
            return Ok(StartOutcome::AlreadyRunning);
        };
        let runtime = registry.runtime();

        let prepare = PrepareContext::new(kind, runtime.storage(), &binary, runtime.vpn_binary());
        if let Err(source) = self.behaviour.prepare(&prepare) {
            self.release_reservation();
            runtime.reporter().prepare_failed(kind, &source);
            registry.notify_start_failure();
            return Err(StartError::Prepare { kind, source });
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let (release, gate) = mpsc::sync_channel(1);
        let supervisor = Supervisor {
            component: Arc::clone(self),
            registry: Arc::clone(&registry),
            binary,
            generation,
            cancel: cancel.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("component-{kind}"))
            .spawn(move || supervisor.run(&gate));
        if let Err(source) = spawned {
            self.release_reservation();
            registry.notify_start_failure();
            return Err(StartError::Spawn { kind, source });
        }
        *self.lock_run() = RunSlot::Active(ActiveRun {
            generation,
            cancel,
            ready: AtomicBool::new(false),
            launched: AtomicBool::new(false),
        });

        runtime.reporter().component_starting(kind);
        registry.notify_state_change();
        // The supervisor holds back until STARTING has been published.
        if release.send(()).is_err() {
            debug!(target: COMPONENT_TARGET, component = %kind, "supervisor exited before release");
        }
        Ok(StartOutcome::Started)
    }

    /// Claims the run slot for a start. `None` means a start is already in
    /// progress or a run is active.
    fn reserve(&self) -> Result<Option<Reservation>, StartError> {
        let kind = self.kind;
        let mut run = self.lock_run();
        if !matches!(*run, RunSlot::Idle) {
            debug!(target: COMPONENT_TARGET, component = %kind, "component already running");
            return Ok(None);
        }
        let Some(registry) = self.registry() else {
            warn!(
                target: COMPONENT_TARGET,
                component = %kind,
                "component is not registered, refusing to start"
            );
            return Err(StartError::Unregistered { kind });
        };
        let Some(binary) = registry.runtime().scion_binary().map(Utf8Path::to_path_buf) else {
            warn!(
                target: COMPONENT_TARGET,
                component = %kind,
                "no SCION binary configured, refusing to start"
            );
            return Err(StartError::MissingBinary { kind });
        };
        let cancel = CancellationToken::new();
        *run = RunSlot::Preparing(cancel.clone());
        self.attempted.store(true, Ordering::SeqCst);
        Ok(Some((registry, binary, cancel)))
    }

    fn release_reservation(&self) {
        let mut run = self.lock_run();
        if matches!(*run, RunSlot::Preparing(_)) {
            *run = RunSlot::Idle;
        }
    }

    /// Asks the active run to stop without waiting for it.
    ///
    /// The transition to stopped is observed through the registry
    /// notification raised when the supervising thread ends. A stop that
    /// arrives while `prepare` is staging files cancels the run before it
    /// launches anything.
    pub fn stop(&self) -> StopOutcome {
        let run = self.lock_run();
        let cancel = match &*run {
            RunSlot::Idle => {
                debug!(target: COMPONENT_TARGET, component = %self.kind, "component already stopped");
                return StopOutcome::AlreadyStopped;
            }
            RunSlot::Preparing(cancel) => cancel,
            RunSlot::Active(active) => &active.cancel,
        };
        info!(target: COMPONENT_TARGET, component = %self.kind, "stopping component");
        self.attempted.store(false, Ordering::SeqCst);
        cancel.cancel();
        StopOutcome::Stopping
    }

    /// Latches readiness for `generation`. Returns whether this call made
    /// the transition.
    pub(crate) fn set_ready(&self, generation: u64) -> bool {
        let first = {
            let run = self.lock_run();
            let Some(active) = run.active(generation) else {
                debug!(
                    target: COMPONENT_TARGET,
                    component = %self.kind,
                    generation,
                    "ignoring readiness from a finished run"
                );
                return false;
            };
            !active.ready.swap(true, Ordering::SeqCst)
        };
        if !first {
            return false;
        }
        let Some(registry) = self.registry() else {
            return true;
        };
        debug!(target: COMPONENT_TARGET, component = %self.kind, generation, "readiness latched");
        registry.runtime().reporter().component_ready(self.kind);
        registry.notify_state_change();
        true
    }

    /// Republishes the stack after the health predicate of `generation`
    /// changed without a lifecycle transition.
    pub(crate) fn health_changed(&self, generation: u64) {
        if self.lock_run().active(generation).is_none() {
            return;
        }
        let Some(registry) = self.registry() else {
            return;
        };
        debug!(
            target: COMPONENT_TARGET,
            component = %self.kind,
            health = %self.health(),
            "component health changed"
        );
        registry.notify_state_change();
    }

    fn mark_launched(&self, generation: u64) {
        if let Some(active) = self.lock_run().active(generation) {
            active.launched.store(true, Ordering::SeqCst);
        }
    }

    /// Whether a live, uncancelled run got past its dependency wait.
    fn has_launched(&self) -> bool {
        match &*self.lock_run() {
            RunSlot::Active(active) => {
                active.launched.load(Ordering::SeqCst) && !active.cancel.is_cancelled()
            }
            RunSlot::Idle | RunSlot::Preparing(_) => false,
        }
    }

    /// Stops a launched run once one of its dependencies is no longer
    /// healthy.
    pub(crate) fn stop_if_dependencies_lost(&self, registry: &RegistryShared) {
        if !self.has_launched() {
            return;
        }
        let pending = registry.pending(self.depends_on());
        if pending.is_empty() {
            return;
        }
        info!(
            target: COMPONENT_TARGET,
            component = %self.kind,
            lost = ?pending,
            "dependency no longer healthy"
        );
        self.stop();
    }

    fn clear_run(&self, generation: u64) -> bool {
        let mut run = self.lock_run();
        if run.active(generation).is_some() {
            *run = RunSlot::Idle;
            true
        } else {
            false
        }
    }

    fn registry(&self) -> Option<Arc<RegistryShared>> {
        self.registry.get().and_then(Weak::upgrade)
    }

    fn lock_run(&self) -> MutexGuard<'_, RunSlot> {
        self.run
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SupervisedComponent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupervisedComponent")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("attempted", &self.was_attempted())
            .finish_non_exhaustive()
    }
}

/// Work carried by one supervising thread.
struct Supervisor {
    component: Arc<SupervisedComponent>,
    registry: Arc<RegistryShared>,
    binary: Utf8PathBuf,
    generation: u64,
    cancel: CancellationToken,
}

impl Supervisor {
    fn run(self, gate: &Receiver<()>) {
        let guard = RunGuard {
            component: &self.component,
            registry: &self.registry,
            generation: self.generation,
        };
        gate.recv().unwrap_or_default();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.supervise()));
        if let Err(payload) = outcome {
            self.registry
                .runtime()
                .reporter()
                .supervisor_panicked(self.component.kind, &panic_message(&*payload));
        }
        drop(guard);
    }

    fn supervise(&self) {
        if !self.wait_for_dependencies() {
            return;
        }
        self.component.mark_launched(self.generation);
        // A dependency may have gone away between the last check and the mark.
        self.component.stop_if_dependencies_lost(&self.registry);
        let kind = self.component.kind;
        let runtime = self.registry.runtime();
        let prepare = PrepareContext::new(kind, runtime.storage(), &self.binary, runtime.vpn_binary());
        let ready = ReadySignal::new(Arc::downgrade(&self.component), self.generation);
        let ctx = RunContext::new(prepare, &self.cancel, ready, runtime.timing().log_poll_interval);

        info!(target: COMPONENT_TARGET, component = %kind, "launching component process");
        if let Err(error) = self.component.behaviour.run(&ctx) {
            runtime.reporter().run_failed(kind, &error);
        }
    }

    /// Polls dependency readiness until it holds, the retry budget runs out,
    /// or the run is cancelled. Returns whether the process may launch.
    fn wait_for_dependencies(&self) -> bool {
        let kind = self.component.kind;
        let dependencies = self.component.depends_on();
        let timing = self.registry.runtime().timing();
        let mut attempt = 0_u32;
        loop {
            if self.cancel.is_cancelled() {
                info!(target: COMPONENT_TARGET, component = %kind, "start abandoned");
                return false;
            }
            if self.registry.is_ready(dependencies) {
                return true;
            }
            if attempt == 0 {
                info!(
                    target: COMPONENT_TARGET,
                    component = %kind,
                    ?dependencies,
                    "waiting for dependencies"
                );
            }
            if attempt >= timing.ready_retries {
                let pending = self.registry.pending(dependencies);
                self.registry
                    .runtime()
                    .reporter()
                    .dependency_timeout(kind, &pending);
                return false;
            }
            attempt += 1;
            if self.cancel.wait_timeout(timing.ready_interval) {
                info!(
                    target: COMPONENT_TARGET,
                    component = %kind,
                    "start abandoned while waiting for dependencies"
                );
                return false;
            }
        }
    }
}

/// Clears the run marker and notifies, however the supervisor ends.
struct RunGuard<'a> {
    component: &'a SupervisedComponent,
    registry: &'a RegistryShared,
    generation: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let kind = self.component.kind;
        if self.component.clear_run(self.generation) {
            self.registry.runtime().reporter().component_stopped(kind);
        } else {
            debug!(
                target: COMPONENT_TARGET,
                component = %kind,
                generation = self.generation,
                "run marker already replaced"
            );
        }
        self.registry.notify_state_change();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
