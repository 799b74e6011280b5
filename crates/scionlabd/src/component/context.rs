//! Collaborators handed to component behaviour.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use scionlab_config::{
    Config, DEFAULT_LOG_POLL_INTERVAL_MS, DEFAULT_READY_INTERVAL_MS, DEFAULT_READY_RETRIES,
    default_vpn_binary,
};
use scionlab_process::{CancellationToken, ExitOutcome, LineWatcher, LogTail, Process, ProcessError};

use super::supervised::SupervisedComponent;
use crate::kind::ComponentKind;
use crate::lifecycle::LifecycleReporter;
use crate::storage::Storage;

/// Timing of the dependency wait and log polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    /// Pause between dependency readiness checks.
    pub ready_interval: Duration,
    /// Checks performed before a start is abandoned.
    pub ready_retries: u32,
    /// Pause between reads of side-channel log files.
    pub log_poll_interval: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            ready_interval: Duration::from_millis(DEFAULT_READY_INTERVAL_MS),
            ready_retries: DEFAULT_READY_RETRIES,
            log_poll_interval: Duration::from_millis(DEFAULT_LOG_POLL_INTERVAL_MS),
        }
    }
}

impl TimingPolicy {
    /// Reads the timing settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_interval: config.ready_interval(),
            ready_retries: config.ready_retries(),
            log_poll_interval: config.log_poll_interval(),
        }
    }
}

/// Collaborators shared by every component of one registry.
#[derive(Clone)]
pub struct RuntimeContext {
    storage: Storage,
    scion_binary: Option<Utf8PathBuf>,
    vpn_binary: Utf8PathBuf,
    reporter: Arc<dyn LifecycleReporter>,
    timing: TimingPolicy,
}

impl RuntimeContext {
    /// Builds a context with no SCION binary and default timing.
    pub fn new(storage: Storage, reporter: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            storage,
            scion_binary: None,
            vpn_binary: default_vpn_binary(),
            reporter,
            timing: TimingPolicy::default(),
        }
    }

    /// Builds a context from the resolved configuration.
    pub fn from_config(config: &Config, reporter: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            storage: Storage::new(config.storage_root().to_path_buf()),
            scion_binary: config.scion_binary().map(Utf8Path::to_path_buf),
            vpn_binary: config.vpn_binary().to_path_buf(),
            reporter,
            timing: TimingPolicy::from_config(config),
        }
    }

    /// Sets the multi-call SCION binary.
    #[must_use]
    pub fn with_scion_binary(mut self, binary: impl Into<Utf8PathBuf>) -> Self {
        self.scion_binary = Some(binary.into());
        self
    }

    /// Sets the VPN client executable.
    #[must_use]
    pub fn with_vpn_binary(mut self, binary: impl Into<Utf8PathBuf>) -> Self {
        self.vpn_binary = binary.into();
        self
    }

    /// Replaces the timing policy.
    #[must_use]
    pub fn with_timing(mut self, timing: TimingPolicy) -> Self {
        self.timing = timing;
        self
    }

    /// Storage shared by all components.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// SCION binary, when configured.
    #[must_use]
    pub fn scion_binary(&self) -> Option<&Utf8Path> {
        self.scion_binary.as_deref()
    }

    /// VPN client executable.
    #[must_use]
    pub fn vpn_binary(&self) -> &Utf8Path {
        self.vpn_binary.as_path()
    }

    /// Reporter receiving lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> &dyn LifecycleReporter {
        self.reporter.as_ref()
    }

    /// Timing policy.
    #[must_use]
    pub fn timing(&self) -> TimingPolicy {
        self.timing
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RuntimeContext")
            .field("storage", &self.storage)
            .field("scion_binary", &self.scion_binary)
            .field("vpn_binary", &self.vpn_binary)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

/// What [`super::Component::prepare`] may use.
#[derive(Debug, Clone, Copy)]
pub struct PrepareContext<'a> {
    kind: ComponentKind,
    storage: &'a Storage,
    binary: &'a Utf8Path,
    vpn_binary: &'a Utf8Path,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(
        kind: ComponentKind,
        storage: &'a Storage,
        binary: &'a Utf8Path,
        vpn_binary: &'a Utf8Path,
    ) -> Self {
        Self {
            kind,
            storage,
            binary,
            vpn_binary,
        }
    }

    /// Role being prepared.
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Shared storage.
    #[must_use]
    pub fn storage(&self) -> &'a Storage {
        self.storage
    }

    /// SCION binary.
    #[must_use]
    pub fn binary(&self) -> &'a Utf8Path {
        self.binary
    }

    /// VPN client executable.
    #[must_use]
    pub fn vpn_binary(&self) -> &'a Utf8Path {
        self.vpn_binary
    }
}

/// What [`super::Component::run`] may use.
#[derive(Debug)]
pub struct RunContext<'a> {
    prepare: PrepareContext<'a>,
    cancel: &'a CancellationToken,
    ready: ReadySignal,
    log_poll_interval: Duration,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        prepare: PrepareContext<'a>,
        cancel: &'a CancellationToken,
        ready: ReadySignal,
        log_poll_interval: Duration,
    ) -> Self {
        Self {
            prepare,
            cancel,
            ready,
            log_poll_interval,
        }
    }

    /// Role being run.
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.prepare.kind()
    }

    /// Shared storage.
    #[must_use]
    pub fn storage(&self) -> &'a Storage {
        self.prepare.storage()
    }

    /// SCION binary.
    #[must_use]
    pub fn binary(&self) -> &'a Utf8Path {
        self.prepare.binary()
    }

    /// VPN client executable.
    #[must_use]
    pub fn vpn_binary(&self) -> &'a Utf8Path {
        self.prepare.vpn_binary()
    }

    /// Token cancelled when the component is asked to stop.
    #[must_use]
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.cancel
    }

    /// Signal that latches readiness for this run.
    #[must_use]
    pub fn ready_signal(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// Starts building an invocation of the SCION binary, tagged with the kind.
    #[must_use]
    pub fn process(&self) -> Process {
        Process::new(self.binary().as_std_path(), self.kind().as_str())
    }

    /// Runs `process` until it exits or this run is cancelled.
    ///
    /// # Errors
    ///
    /// Propagates [`ProcessError`] from [`Process::run`].
    pub fn supervise(&self, process: Process) -> Result<ExitOutcome, ProcessError> {
        process.run(self.cancel)
    }

    /// Tails a side-channel log file for the rest of this run.
    ///
    /// The tail stops when the returned handle is dropped or the run is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the tail thread cannot be started.
    pub fn watch_log_file(
        &self,
        path: impl AsRef<Path>,
        watchers: Vec<LineWatcher>,
    ) -> Result<LogTail, ProcessError> {
        LogTail::spawn(
            self.kind().as_str(),
            path.as_ref(),
            watchers,
            self.log_poll_interval,
            self.cancel,
        )
    }
}

/// Latches readiness for one run of one component, and republishes its
/// health when that changes on its own.
///
/// Signals outliving their run are ignored, so a late line from a previous
/// process cannot mark a newer run ready.
#[derive(Clone)]
pub struct ReadySignal {
    component: Weak<SupervisedComponent>,
    generation: u64,
}

impl ReadySignal {
    pub(crate) fn new(component: Weak<SupervisedComponent>, generation: u64) -> Self {
        Self {
            component,
            generation,
        }
    }

    /// Marks the run ready and notifies the registry.
    ///
    /// Repeated calls are harmless: only the first one is reported as a
    /// transition.
    pub fn fire(&self) {
        if let Some(component) = self.component.upgrade() {
            component.set_ready(self.generation);
        }
    }

    /// Like [`ReadySignal::fire`], returning whether this call made the
    /// transition.
    #[must_use]
    pub fn latch(&self) -> bool {
        self.component
            .upgrade()
            .is_some_and(|component| component.set_ready(self.generation))
    }

    /// Republishes the stack snapshot for a component whose health depends
    /// on more than its lifecycle state. Ignored once the run has ended.
    pub fn health_changed(&self) {
        if let Some(component) = self.component.upgrade() {
            component.health_changed(self.generation);
        }
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReadySignal")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
