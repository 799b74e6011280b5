//! Component behaviour and the state machine that supervises it.
//!
//! A [`Component`] describes one role in the stack: which roles it depends
//! on, how to stage its files, and how to run its process. A
//! [`SupervisedComponent`] wraps that behaviour with the lifecycle rules shared
//! by every role. Starting spawns a dedicated thread that waits for the
//! dependencies to become healthy, runs the process, and marks the component
//! stopped again when the process ends, however it ends.

mod context;
mod supervised;

use camino::Utf8PathBuf;
use scionlab_process::ProcessError;
use thiserror::Error;

use crate::kind::{ComponentKind, ComponentState};
use crate::storage::StorageError;

pub use context::{PrepareContext, ReadySignal, RunContext, RuntimeContext, TimingPolicy};
pub use supervised::{COMPONENT_TARGET, StartError, StartOutcome, StopOutcome, SupervisedComponent};

/// Errors raised while staging a component before its thread is spawned.
#[derive(Debug, Error)]
pub enum PrepareError {
    /// Staging files in storage failed.
    #[error("failed to stage component files: {source}")]
    Storage {
        /// Underlying storage error.
        #[from]
        source: StorageError,
    },
    /// A file the component needs does not exist.
    #[error("required file '{path}' does not exist")]
    MissingFile {
        /// Path that was expected to exist.
        path: Utf8PathBuf,
    },
}

/// Behaviour of one stack role.
pub trait Component: Send + Sync + 'static {
    /// Role implemented by this behaviour.
    fn kind(&self) -> ComponentKind;

    /// Roles that must be healthy before the process is launched.
    fn depends_on(&self) -> &[ComponentKind] {
        &[]
    }

    /// Stages files on the caller's thread before the supervisor is spawned.
    ///
    /// # Errors
    ///
    /// A failure aborts the start: no thread is spawned and the component
    /// stays stopped.
    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs the process, blocking until it exits or the run is cancelled.
    ///
    /// Implementations fire [`RunContext::ready_signal`] once the process
    /// reports that it finished initialising.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the process cannot be run. The error is
    /// reported and the component stops as if the process had exited.
    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError>;

    /// Whether a component in `state` counts as healthy.
    fn is_healthy(&self, state: ComponentState) -> bool {
        state == ComponentState::Ready
    }
}
