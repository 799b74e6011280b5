//! Delivery of aggregate stack state to interested parties.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::kind::{ComponentKind, HealthStatus};

/// Log target for registry notifications.
pub const REGISTRY_TARGET: &str = "scionlabd::registry";

/// Aggregate state plus the per-component breakdown it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackSnapshot {
    /// Aggregate state of the whole stack.
    pub state: HealthStatus,
    /// Health of every registered component.
    pub components: BTreeMap<ComponentKind, HealthStatus>,
}

impl StackSnapshot {
    /// Health of one component, when registered.
    #[must_use]
    pub fn component(&self, kind: ComponentKind) -> Option<HealthStatus> {
        self.components.get(&kind).copied()
    }
}

/// Receives a snapshot after every state change.
///
/// Snapshots arrive one at a time, in order, on whichever thread caused the
/// change. Implementations must return promptly and must not call back into
/// the registry that notified them.
#[cfg_attr(test, mockall::automock)]
pub trait StateObserver: Send + Sync {
    /// Called with the recomputed snapshot.
    fn state_changed(&self, snapshot: &StackSnapshot);
}

impl<T> StateObserver for Arc<T>
where
    T: StateObserver + ?Sized,
{
    fn state_changed(&self, snapshot: &StackSnapshot) {
        (**self).state_changed(snapshot);
    }
}

/// Observer that logs each snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStateObserver;

impl StateObserver for LoggingStateObserver {
    fn state_changed(&self, snapshot: &StackSnapshot) {
        let components = snapshot
            .components
            .iter()
            .map(|(kind, status)| format!("{kind}={status}"))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            target: REGISTRY_TARGET,
            event = "state_changed",
            state = %snapshot.state,
            components = %components,
            "stack state changed"
        );
    }
}
