//! Behaviour of each role in a local SCION AS stack.
//!
//! Every SCION role runs the same multi-call binary with a role-selecting
//! first argument and a rendered TOML configuration. Readiness is detected
//! from a log line specific to each role.

mod border_router;
mod control_server;
mod daemon;
mod dispatcher;
mod scmp;
mod vpn_client;

use scionlab_process::{LineWatcher, ProcessError, compile_pattern};

use crate::component::RunContext;

pub use border_router::BorderRouter;
pub use control_server::ControlServer;
pub use daemon::Daemon;
pub use dispatcher::Dispatcher;
pub use scmp::{SCMP_HEALTH_TIMEOUT, Scmp};
pub use vpn_client::VpnClient;

/// Directory holding the SCION configuration, relative to the storage root.
pub const CONFIG_DIRECTORY: &str = "config";

/// Dispatcher socket, relative to the storage root.
pub const DISPATCHER_SOCKET: &str = "run/dispatcher.sock";

/// Environment variable pointing SCION services at the dispatcher socket.
pub const DISPATCHER_SOCKET_ENV: &str = "DISPATCHER_SOCKET";

/// Level passed to the SCION services; lines are filtered again by `tracing`.
const PROCESS_LOG_LEVEL: &str = "info";

/// Watcher firing the run's readiness signal on every line matching `pattern`.
fn ready_watcher(ctx: &RunContext<'_>, pattern: &str) -> Result<LineWatcher, ProcessError> {
    let signal = ctx.ready_signal();
    Ok(LineWatcher::every(compile_pattern(pattern)?, move || signal.fire()))
}
