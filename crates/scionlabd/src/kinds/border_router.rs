use scionlab_process::{ProcessError, compile_pattern};
use tracing::error;

use super::{
    CONFIG_DIRECTORY, DISPATCHER_SOCKET, DISPATCHER_SOCKET_ENV, PROCESS_LOG_LEVEL, ready_watcher,
};
use crate::component::{COMPONENT_TARGET, Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;
use crate::storage::render_template;

const BINARY_FLAG: &str = "border";
const CONFIG_TEMPLATE: &str = "border_router.toml";
const CONFIG_PATH: &str = "config/border_router.toml";
const READY_PATTERN: &str = "Service started SCION Router";
const VPN_NOT_READY_PATTERN: &str = "bind: cannot assign requested address";
const DEPENDENCIES: [ComponentKind; 2] = [ComponentKind::Dispatcher, ComponentKind::VpnClient];

/// Forwards packets across the AS boundary, through the VPN tunnel when one
/// is part of the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct BorderRouter;

impl Component for BorderRouter {
    fn kind(&self) -> ComponentKind {
        ComponentKind::BorderRouter
    }

    fn depends_on(&self) -> &[ComponentKind] {
        &DEPENDENCIES
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let storage = ctx.storage();
        let config_dir = storage.absolute_path(CONFIG_DIRECTORY)?;
        let config = render_template(
            storage.read_asset_file(CONFIG_TEMPLATE)?,
            &[
                ("config_dir", config_dir.as_str()),
                ("log_level", PROCESS_LOG_LEVEL),
            ],
        );
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
            .watcher(ready_watcher(ctx, READY_PATTERN)?)
            .watch_for(compile_pattern(VPN_NOT_READY_PATTERN)?, || {
                error!(
                    target: COMPONENT_TARGET,
                    component = %ComponentKind::BorderRouter,
                    "could not start border router, please check the VPN connection"
                );
            });
        ctx.supervise(process)?;
        Ok(())
    }
}
