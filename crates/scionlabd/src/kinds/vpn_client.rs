use camino::Utf8PathBuf;
use scionlab_process::{Process, ProcessError};

use super::ready_watcher;
use crate::component::{Component, PrepareContext, PrepareError, RunContext};
use crate::kind::ComponentKind;

const READY_PATTERN: &str = "Initialization Sequence Completed";

/// OpenVPN tunnel to the AS attachment point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnClient {
    config: Utf8PathBuf,
}

impl VpnClient {
    /// Builds a client using the OpenVPN configuration at `config`.
    pub fn new(config: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// OpenVPN configuration file.
    #[must_use]
    pub fn config(&self) -> &camino::Utf8Path {
        self.config.as_path()
    }
}

impl Component for VpnClient {
    fn kind(&self) -> ComponentKind {
        ComponentKind::VpnClient
    }

    fn prepare(&self, ctx: &PrepareContext<'_>) -> Result<(), PrepareError> {
        let _ = ctx;
        if self.config.is_file() {
            Ok(())
        } else {
            Err(PrepareError::MissingFile {
                path: self.config.clone(),
            })
        }
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<(), ProcessError> {
        let process = Process::new(ctx.vpn_binary().as_std_path(), ctx.kind().as_str())
            .config_file(&self.config)
            .watcher(ready_watcher(ctx, READY_PATTERN)?);
        ctx.supervise(process)?;
        Ok(())
    }
}
