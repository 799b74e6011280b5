use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use scionlab_process::{CancellationToken, LineWatcher, ProcessError, compile_pattern};

use super::DISPATCHER_SOCKET;
use crate::component::{Component, ReadySignal, RunContext};
use crate::kind::{ComponentKind, ComponentState};

const TOOL_FLAG: &str = "scion";
const ECHO_FLAG: &str = "ping";
const DISPATCHER_FLAG: &str = "--dispatcher";
const REPLY_PATTERN: &str = "bytes from";
const DEPENDENCIES: [ComponentKind; 3] = [
    ComponentKind::Dispatcher,
    ComponentKind::Daemon,
    ComponentKind::BorderRouter,
];

/// How long a ping component stays healthy after the last echo reply.
pub const SCMP_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a running ping checks whether its replies went stale.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Continuous SCMP echo towards a remote address.
///
/// Healthy only while replies keep arriving.
#[derive(Debug, Clone)]
pub struct Scmp {
    address: String,
    last_reply: Arc<Mutex<Option<Instant>>>,
}

impl Scmp {
    /// Builds a component pinging `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_reply: Arc::new(Mutex::new(None)),
        }
    }

    /// Remote SCION address being pinged.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    fn record_reply(slot: &Mutex<Option<Instant>>, at: Option<Instant>) {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    fn fresh(slot: &Mutex<Option<Instant>>) -> bool {
        slot.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < SCMP_HEALTH_TIMEOUT)
    }

    /// Republishes the stack each time the last reply goes stale, until
    /// `done` fires. Recoveries are published by the reply watcher.
    fn watch_for_staleness(&self, signal: &ReadySignal, done: &CancellationToken) {
        let mut fresh = false;
        while !done.wait_timeout(HEALTH_CHECK_INTERVAL) {
            let now_fresh = Self::fresh(&self.last_reply);
            if fresh && !now_fresh {
                signal.health_changed();
            }
            fresh = now_fresh;
        }
    }
}

impl Component for Scmp {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Scmp
    }

    fn depends_on(&self) -> &[ComponentKind] {
        &DEPENDENCIES
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError> {
        Self::record_reply(&self.last_reply, None);
        let signal = ctx.ready_signal();
        let last_reply = Arc::clone(&self.last_reply);
        let on_reply = LineWatcher::every(compile_pattern(REPLY_PATTERN)?, move || {
            let restored = !Self::fresh(&last_reply);
            Self::record_reply(&last_reply, Some(Instant::now()));
            if !signal.latch() && restored {
                signal.health_changed();
            }
        });
        let process = ctx
            .process()
            .args([TOOL_FLAG, ECHO_FLAG, self.address.as_str(), DISPATCHER_FLAG])
            .arg(ctx.storage().root().join(DISPATCHER_SOCKET))
            .watcher(on_reply);

        let done = CancellationToken::new();
        let health = ctx.ready_signal();
        thread::scope(|scope| {
            thread::Builder::new()
                .name(format!("{}-health", ctx.kind()))
                .spawn_scoped(scope, || self.watch_for_staleness(&health, &done))
                .map_err(|source| ProcessError::Thread {
                    tag: ctx.kind().as_str().to_owned(),
                    role: "health check",
                    source,
                })?;
            let outcome = ctx.supervise(process);
            done.cancel();
            outcome.map(|_| ())
        })
    }

    fn is_healthy(&self, state: ComponentState) -> bool {
        state == ComponentState::Ready && Self::fresh(&self.last_reply)
    }
}
