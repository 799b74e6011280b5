use scionlab_process::ProcessError;

use super::{CONFIG_DIRECTORY, DISPATCHER_SOCKET, DISPATCHER_SOCKET_ENV, PROCESS_LOG_LEVEL, ready_watcher};
use crate::component::{Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;
use crate::storage::render_template;

const BINARY_FLAG: &str = "cs";
const CONFIG_TEMPLATE: &str = "control_server.toml";
const CONFIG_PATH: &str = "config/control_server.toml";
const DATABASES: [(&str, &str); 3] = [
    ("trust_db", "databases/control_server.trust.db"),
    ("path_db", "databases/control_server.path.db"),
    ("beacon_db", "databases/control_server.beacon.db"),
];
const READY_PATTERN: &str = "Started periodic tasks";
const DEPENDENCIES: [ComponentKind; 1] = [ComponentKind::Dispatcher];

/// Beaconing, path registration, and trust material for the AS.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlServer;

impl Component for ControlServer {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ControlServer
    }

    fn depends_on(&self) -> &[ComponentKind] {
        &DEPENDENCIES
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let storage = ctx.storage();
        let staged = storage.prepare_files(&DATABASES.map(|(_, file)| file))?;
        let config_dir = storage.absolute_path(CONFIG_DIRECTORY)?;
        let mut values: Vec<(&str, &str)> = DATABASES
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
        let process = ctx
            .process()
            .env(DISPATCHER_SOCKET_ENV, root.join(DISPATCHER_SOCKET))
            .arg(BINARY_FLAG)
            .config_file(root.join(CONFIG_PATH))
            .watcher(ready_watcher(ctx, READY_PATTERN)?);
        ctx.supervise(process)?;
        Ok(())
    }
}
