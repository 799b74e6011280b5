//! Component double driven by a `/bin/sh` script.

use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use scionlab_process::{LineWatcher, ProcessError, compile_pattern};

use crate::component::{Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;

/// Line the scripts print to announce readiness.
pub const READY_LINE: &str = "component ready";

/// Storage file written when a gated `prepare` begins waiting.
pub const PREPARING_MARKER: &str = "preparing";

const PREPARE_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Script {
    Shell(String),
    FailPrepare,
    Panic,
}

/// Behaviour whose run is a shell script announcing [`READY_LINE`].
///
/// The harness configures `/bin/sh` as the SCION binary, so
/// [`RunContext::process`] yields a shell.
#[derive(Debug, Clone)]
pub struct ScriptedComponent {
    kind: ComponentKind,
    dependencies: Vec<ComponentKind>,
    script: Script,
    prepare_gate: Option<Utf8PathBuf>,
}

impl ScriptedComponent {
    fn shell(kind: ComponentKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            dependencies: Vec::new(),
            prepare_gate: None,
            script: Script::Shell(body.into()),
        }
    }

    /// Announces readiness twice, then keeps running.
    pub fn ready_immediately(kind: ComponentKind) -> Self {
        Self::shell(
            kind,
            format!("echo '{READY_LINE}'; echo '{READY_LINE}'; exec sleep 30"),
        )
    }

    /// Announces readiness once `gate` exists, then keeps running.
    pub fn ready_when(kind: ComponentKind, gate: &Utf8Path) -> Self {
        Self::shell(
            kind,
            format!(
                "while [ ! -e '{gate}' ]; do sleep 0.05; done; echo '{READY_LINE}'; exec sleep 30"
            ),
        )
    }

    /// Runs without ever announcing readiness.
    pub fn never_ready(kind: ComponentKind) -> Self {
        Self::shell(kind, "exec sleep 30")
    }

    /// Announces readiness, then exits with `code`.
    pub fn exits_after_ready(kind: ComponentKind, code: i32) -> Self {
        Self::shell(kind, format!("echo '{READY_LINE}'; sleep 0.2; exit {code}"))
    }

    /// Refuses to prepare.
    pub fn failing_prepare(kind: ComponentKind) -> Self {
        Self {
            kind,
            dependencies: Vec::new(),
            prepare_gate: None,
            script: Script::FailPrepare,
        }
    }

    /// Panics on the supervising thread.
    pub fn panicking(kind: ComponentKind) -> Self {
        Self {
            kind,
            dependencies: Vec::new(),
            prepare_gate: None,
            script: Script::Panic,
        }
    }

    /// Holds `prepare` until `gate` exists, after writing
    /// [`PREPARING_MARKER`].
    #[must_use]
    pub fn prepared_after(mut self, gate: &Utf8Path) -> Self {
        self.prepare_gate = Some(gate.to_path_buf());
        self
    }

    /// Adds `dependency` to the roles awaited before the run.
    #[must_use]
    pub fn after(mut self, dependency: ComponentKind) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

impl Component for ScriptedComponent {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn depends_on(&self) -> &[ComponentKind] {
        &self.dependencies
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        if let Some(gate) = &self.prepare_gate {
            ctx.storage().write_file(PREPARING_MARKER, "")?;
            let deadline = Instant::now() + PREPARE_BUDGET;
            while !gate.exists() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
        }
        match self.script {
            Script::FailPrepare => Err(PrepareError::MissingFile {
                path: Utf8PathBuf::from(format!("{}/missing.conf", ctx.storage().root())),
            }),
            Script::Shell(_) | Script::Panic => Ok(()),
        }
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError> {
        match &self.script {
            Script::Shell(body) => {
                let signal = ctx.ready_signal();
                let watcher =
                    LineWatcher::every(compile_pattern(READY_LINE)?, move || signal.fire());
                let process = ctx.process().arg("-c").arg(body.as_str()).watcher(watcher);
                ctx.supervise(process)?;
                Ok(())
            }
            Script::Panic => panic!("scripted supervisor failure"),
            Script::FailPrepare => Ok(()),
        }
    }
}
