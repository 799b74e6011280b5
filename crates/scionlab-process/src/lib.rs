//! External process plumbing for the SCIONLab stack supervisor.
//!
//! The crate launches one external binary at a time, re-emits its output
//! through `tracing` at the level encoded in each SCION log line, and lets
//! callers attach regular-expression watchers that react to specific lines.
//! Every blocking operation honours a [`CancellationToken`] so supervisors can
//! stop a process cooperatively: the child receives `SIGTERM` and is killed
//! only if it outlives the grace period.

mod cancel;
mod error;
mod lines;
mod process;
mod tail;
mod watch;

pub use cancel::CancellationToken;
pub use error::ProcessError;
pub use lines::{LineClassifier, OUTPUT_TARGET, forward_line};
pub use process::{CONFIG_FLAG, ExitOutcome, PROCESS_TARGET, Process, VERSION_FLAG, version};
pub use tail::LogTail;
pub use watch::{LineWatcher, WatchCallback, compile_pattern};

#[cfg(test)]
mod tests;
