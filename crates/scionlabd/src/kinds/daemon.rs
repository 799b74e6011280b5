use scionlab_process::{LineWatcher, ProcessError, compile_pattern};

use super::{CONFIG_DIRECTORY, DISPATCHER_SOCKET, DISPATCHER_SOCKET_ENV, PROCESS_LOG_LEVEL};
use crate::component::{Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;
use crate::storage::render_template;

const BINARY_FLAG: &str = "sciond";
const CONFIG_TEMPLATE: &str = "daemon.toml";
const CONFIG_PATH: &str = "config/daemon.toml";
const LOG_PATH: &str = "logs/daemon.log";
const STAGED_FILES: [(&str, &str); 3] = [
    ("trust_db", "databases/daemon.trust.db"),
    ("path_db", "databases/daemon.path.db"),
    ("log_file", LOG_PATH),
];
const READY_PATTERN: &str = "Service started SCION Daemon";
const DEPENDENCIES: [ComponentKind; 1] = [ComponentKind::Dispatcher];

/// End-host daemon. It announces readiness only in its log file, so the run
/// tails that file alongside the process output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Daemon;

impl Component for Daemon {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Daemon
    }

    fn depends_on(&self) -> &[ComponentKind] {
        &DEPENDENCIES
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let storage = ctx.storage();
        let staged = storage.prepare_files(&STAGED_FILES.map(|(_, file)| file))?;
        let config_dir = storage.absolute_path(CONFIG_DIRECTORY)?;
        let mut values: Vec<(&str, &str)> = STAGED_FILES
            .iter()
            .map(|(key, _)| *key)
            .zip(staged.iter().map(|path| path.as_str()))
            .collect();
        values.push(("config_dir", config_dir.as_str()));
        values.push(("log_level", PROCESS_LOG_LEVEL));
        let config = render_template(storage.read_asset_file(CONFIG_TEMPLATE)?, &values);
        storage.write_file(CONFIG_PATH, &config)?;
        Ok(())
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError> {
        let root = ctx.storage().root();
        let signal = ctx.ready_signal();
        let watcher = LineWatcher::once(compile_pattern(READY_PATTERN)?, move || signal.fire());
        let tail = ctx.watch_log_file(root.join(LOG_PATH), vec![watcher])?;
        let process = ctx
            .process()
            .env(DISPATCHER_SOCKET_ENV, root.join(DISPATCHER_SOCKET))
            .arg(BINARY_FLAG)
            .config_file(root.join(CONFIG_PATH));
        let outcome = ctx.supervise(process);
        tail.stop();
        outcome.map(|_| ())
    }
}
