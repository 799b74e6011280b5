//! Structured reporting for component lifecycle events.

use std::sync::Arc;

use scionlab_process::ProcessError;

use crate::component::PrepareError;
use crate::kind::ComponentKind;

/// Log target for lifecycle events.
pub const LIFECYCLE_TARGET: &str = "scionlabd::lifecycle";

/// Observer for lifecycle events raised by supervised components.
///
/// The reporter also receives panics caught on supervising threads, so it
/// doubles as the stack-wide failure handler.
pub trait LifecycleReporter: Send + Sync {
    /// A supervising thread was spawned.
    fn component_starting(&self, kind: ComponentKind);

    /// The readiness pattern matched for the first time in the current run.
    fn component_ready(&self, kind: ComponentKind);

    /// A supervising thread finished.
    fn component_stopped(&self, kind: ComponentKind);

    /// Staging failed, so no thread was spawned.
    fn prepare_failed(&self, kind: ComponentKind, error: &PrepareError);

    /// Dependencies were still not ready after the retry budget.
    fn dependency_timeout(&self, kind: ComponentKind, pending: &[ComponentKind]);

    /// The supervised process could not be run.
    fn run_failed(&self, kind: ComponentKind, error: &ProcessError);

    /// The supervising thread panicked.
    fn supervisor_panicked(&self, kind: ComponentKind, message: &str);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn component_starting(&self, kind: ComponentKind) {
        (**self).component_starting(kind);
    }

    fn component_ready(&self, kind: ComponentKind) {
        (**self).component_ready(kind);
    }

    fn component_stopped(&self, kind: ComponentKind) {
        (**self).component_stopped(kind);
    }

    fn prepare_failed(&self, kind: ComponentKind, error: &PrepareError) {
        (**self).prepare_failed(kind, error);
    }

    fn dependency_timeout(&self, kind: ComponentKind, pending: &[ComponentKind]) {
        (**self).dependency_timeout(kind, pending);
    }

    fn run_failed(&self, kind: ComponentKind, error: &ProcessError) {
        (**self).run_failed(kind, error);
    }

    fn supervisor_panicked(&self, kind: ComponentKind, message: &str) {
        (**self).supervisor_panicked(kind, message);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn component_starting(&self, kind: ComponentKind) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "component_starting",
            component = %kind,
            "component starting"
        );
    }

    fn component_ready(&self, kind: ComponentKind) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "component_ready",
            component = %kind,
            "component is ready"
        );
    }

    fn component_stopped(&self, kind: ComponentKind) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "component_stopped",
            component = %kind,
            "component stopped"
        );
    }

    fn prepare_failed(&self, kind: ComponentKind, error: &PrepareError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "prepare_failed",
            component = %kind,
            error = %error,
            "component preparation failed"
        );
    }

    fn dependency_timeout(&self, kind: ComponentKind, pending: &[ComponentKind]) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "dependency_timeout",
            component = %kind,
            ?pending,
            "dependencies did not become ready, giving up"
        );
    }

    fn run_failed(&self, kind: ComponentKind, error: &ProcessError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "run_failed",
            component = %kind,
            error = %error,
            "component process failed"
        );
    }

    fn supervisor_panicked(&self, kind: ComponentKind, message: &str) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "supervisor_panicked",
            component = %kind,
            panic = message,
            "component supervisor panicked"
        );
    }
}
