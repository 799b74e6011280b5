//! Observer double capturing every published snapshot.

use std::sync::Mutex;

use crate::kind::{ComponentKind, HealthStatus};
use crate::observer::{StackSnapshot, StateObserver};

#[derive(Debug, Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<StackSnapshot>>,
}

impl RecordingObserver {
    pub fn snapshots(&self) -> Vec<StackSnapshot> {
        self.snapshots
            .lock()
            .expect("observer mutex poisoned")
            .clone()
    }

    /// Per-snapshot health of `kind`, in publication order.
    pub fn history(&self, kind: ComponentKind) -> Vec<Option<HealthStatus>> {
        self.snapshots()
            .iter()
            .map(|snapshot| snapshot.component(kind))
            .collect()
    }

    pub fn last_state(&self) -> Option<HealthStatus> {
        self.snapshots().last().map(|snapshot| snapshot.state)
    }
}

impl StateObserver for RecordingObserver {
    fn state_changed(&self, snapshot: &StackSnapshot) {
        self.snapshots
            .lock()
            .expect("observer mutex poisoned")
            .push(snapshot.clone());
    }
}
