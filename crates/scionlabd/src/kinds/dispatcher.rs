use scionlab_process::ProcessError;

use super::{DISPATCHER_SOCKET, PROCESS_LOG_LEVEL, ready_watcher};
use crate::component::{Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;
use crate::storage::render_template;

const BINARY_FLAG: &str = "dispatcher";
const CONFIG_TEMPLATE: &str = "dispatcher.toml";
const CONFIG_PATH: &str = "config/dispatcher.toml";
const READY_PATTERN: &str = "Service started SCION Dispatcher";

/// Relays packets between local applications and the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Component for Dispatcher {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Dispatcher
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let storage = ctx.storage();
        let socket = storage.prepare_socket(DISPATCHER_SOCKET)?;
        let config = render_template(
            storage.read_asset_file(CONFIG_TEMPLATE)?,
            &[("socket", socket.as_str()), ("log_level", PROCESS_LOG_LEVEL)],
        );
        storage.write_file(CONFIG_PATH, &config)?;
        Ok(())
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError> {
        let process = ctx
            .process()
            .arg(BINARY_FLAG)
            .config_file(ctx.storage().root().join(CONFIG_PATH))
            .watcher(ready_watcher(ctx, READY_PATTERN)?);
        ctx.supervise(process)?;
        Ok(())
    }
}
