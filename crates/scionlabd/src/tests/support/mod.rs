//! Shared doubles and harnesses for the supervisor test suites.

mod binary;
mod harness;
mod observer;
mod reporter;
mod scripted;

pub use binary::fake_scion_binary;
pub use harness::{StackHarness, wait_until};
pub use observer::RecordingObserver;
pub use reporter::{LifecycleEvent, RecordingLifecycleReporter};
pub use scripted::{PREPARING_MARKER, ScriptedComponent};
