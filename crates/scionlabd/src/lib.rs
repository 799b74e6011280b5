//! Dependency-gated supervisor for a local SCION AS stack.
//!
//! The supervisor runs the processes that make up a SCIONLab AS (dispatcher,
//! VPN client, daemon, control server, border router, and an optional SCMP
//! check) and starts each one only after the components it depends on report
//! ready. Readiness is read from each process's own log output.
//!
//! Every component moves through `stopped → starting → ready → stopped`
//! under a [`SupervisedComponent`] which owns one OS thread per run. The
//! [`ComponentRegistry`] holds one component per [`ComponentKind`], answers
//! dependency queries, and publishes a [`StackSnapshot`] to its
//! [`StateObserver`] after every transition.
//!
//! Nothing restarts automatically: a process that exits, crashes, or is
//! stopped leaves its component stopped until the caller starts it again.

mod component;
mod kind;
pub mod kinds;
mod launch;
mod lifecycle;
mod observer;
mod registry;
pub mod session;
mod shutdown;
pub mod storage;
pub mod telemetry;

pub use component::{
    COMPONENT_TARGET, Component, PrepareContext, PrepareError, ReadySignal, RunContext,
    RuntimeContext, StartError, StartOutcome, StopOutcome, SupervisedComponent, TimingPolicy,
};
pub use kind::{ComponentKind, ComponentKindParseError, ComponentState, HealthStatus};
pub use launch::{LAUNCH_TARGET, LaunchError, run_daemon, run_session};
pub use lifecycle::{LIFECYCLE_TARGET, LifecycleReporter, StructuredLifecycleReporter};
pub use observer::{LoggingStateObserver, REGISTRY_TARGET, StackSnapshot, StateObserver};
pub use registry::{ComponentRegistry, RegistryError, aggregate_state};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use storage::{Storage, StorageError};
pub use telemetry::TelemetryError;

#[cfg(test)]
mod tests;
