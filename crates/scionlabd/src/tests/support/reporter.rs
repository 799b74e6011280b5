//! Test double for [`LifecycleReporter`] that records events for assertions.

use std::sync::Mutex;

use scionlab_process::ProcessError;

use crate::component::PrepareError;
use crate::kind::ComponentKind;
use crate::lifecycle::LifecycleReporter;

/// Lifecycle events captured during a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Starting(ComponentKind),
    Ready(ComponentKind),
    Stopped(ComponentKind),
    PrepareFailed(ComponentKind),
    DependencyTimeout {
        kind: ComponentKind,
        pending: Vec<ComponentKind>,
    },
    RunFailed(ComponentKind),
    Panicked {
        kind: ComponentKind,
        message: String,
    },
}

/// Records lifecycle events in arrival order.
#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .clone()
    }

    /// Number of recorded events equal to `event`.
    pub fn count(&self, event: &LifecycleEvent) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &LifecycleEvent) -> Option<usize> {
        self.events().iter().position(|recorded| recorded == event)
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn component_starting(&self, kind: ComponentKind) {
        self.record(LifecycleEvent::Starting(kind));
    }

    fn component_ready(&self, kind: ComponentKind) {
        self.record(LifecycleEvent::Ready(kind));
    }

    fn component_stopped(&self, kind: ComponentKind) {
        self.record(LifecycleEvent::Stopped(kind));
    }

    fn prepare_failed(&self, kind: ComponentKind, _error: &PrepareError) {
        self.record(LifecycleEvent::PrepareFailed(kind));
    }

    fn dependency_timeout(&self, kind: ComponentKind, pending: &[ComponentKind]) {
        self.record(LifecycleEvent::DependencyTimeout {
            kind,
            pending: pending.to_vec(),
        });
    }

    fn run_failed(&self, kind: ComponentKind, _error: &ProcessError) {
        self.record(LifecycleEvent::RunFailed(kind));
    }

    fn supervisor_panicked(&self, kind: ComponentKind, message: &str) {
        self.record(LifecycleEvent::Panicked {
            kind,
            message: message.to_owned(),
        });
    }
}
