//! A registry wired to recording doubles and temporary storage.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use super::{RecordingLifecycleReporter, RecordingObserver};
use crate::component::{Component, RuntimeContext, TimingPolicy};
use crate::kind::{ComponentKind, HealthStatus};
use crate::registry::ComponentRegistry;
use crate::storage::Storage;

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Timing suited to tests: 20 ms polls with a five second budget.
pub fn fast_timing() -> TimingPolicy {
    TimingPolicy {
        ready_interval: Duration::from_millis(20),
        ready_retries: 250,
        log_poll_interval: Duration::from_millis(20),
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Builds the registry lazily so scenarios can adjust timing and add
/// components first. Dropping the harness stops whatever still runs.
pub struct StackHarness {
    pending: Vec<Box<dyn Component>>,
    timing: TimingPolicy,
    scion_binary: Utf8PathBuf,
    registry: Option<ComponentRegistry>,
    pub reporter: Arc<RecordingLifecycleReporter>,
    pub observer: Arc<RecordingObserver>,
    root: Utf8PathBuf,
    _temp_dir: TempDir,
}

impl StackHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temporary storage");
        let root = Utf8Path::from_path(temp_dir.path())
            .expect("temporary directory should be UTF-8")
            .to_path_buf();
        Self {
            pending: Vec::new(),
            timing: fast_timing(),
            scion_binary: Utf8PathBuf::from("/bin/sh"),
            registry: None,
            reporter: Arc::new(RecordingLifecycleReporter::default()),
            observer: Arc::new(RecordingObserver::default()),
            root,
            _temp_dir: temp_dir,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        self.root.as_path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.root.clone())
    }

    /// Gate file that releases [`super::ScriptedComponent::ready_when`].
    pub fn gate(&self, kind: ComponentKind) -> Utf8PathBuf {
        self.root.join(format!("{kind}.gate"))
    }

    pub fn release(&self, kind: ComponentKind) {
        std::fs::write(self.gate(kind), b"").expect("failed to write gate file");
    }

    /// Replaces `/bin/sh` with [`super::fake_scion_binary`].
    pub fn use_fake_scion_binary(&mut self) {
        self.scion_binary = super::fake_scion_binary(&self.root);
    }

    pub fn set_ready_retries(&mut self, retries: u32) {
        self.timing.ready_retries = retries;
    }

    pub fn add(&mut self, component: impl Component) {
        assert!(self.registry.is_none(), "registry already built");
        self.pending.push(Box::new(component));
    }

    pub fn runtime(&self) -> RuntimeContext {
        RuntimeContext::new(self.storage(), self.reporter.clone())
            .with_scion_binary(self.scion_binary.clone())
            .with_timing(self.timing)
    }

    pub fn registry(&mut self) -> &ComponentRegistry {
        if self.registry.is_none() {
            let registry = ComponentRegistry::new(self.runtime(), Arc::clone(&self.observer));
            for component in self.pending.drain(..) {
                registry
                    .register_boxed(component)
                    .expect("scenario registers each kind once");
            }
            self.registry = Some(registry);
        }
        self.registry.as_ref().expect("registry was just built")
    }

    /// Waits for `kind` to reach `health`.
    pub fn wait_for_health(&mut self, kind: ComponentKind, health: HealthStatus) -> bool {
        let registry = self.registry().clone();
        wait_until(SHUTDOWN_BUDGET, || registry.component_health(kind) == Some(health))
    }
}

impl Default for StackHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StackHarness {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.stop_all();
            registry.wait_until_stopped(SHUTDOWN_BUDGET);
        }
    }
}
