//! Assembling the components of one supervisor session.
//!
//! A session stages the user's SCION configuration, then registers every
//! component the plan calls for. The VPN client joins only when an OpenVPN
//! configuration is available and the ping only when a target address
//! is given.

use camino::{Utf8Path, Utf8PathBuf};
use scionlab_config::Config;
use scionlab_process::{ProcessError, compile_pattern};
use thiserror::Error;
use tracing::{info, warn};

use crate::component::RuntimeContext;
use crate::kinds::{
    BorderRouter, CONFIG_DIRECTORY, ControlServer, Daemon, Dispatcher, Scmp, VpnClient,
};
use crate::observer::StateObserver;
use crate::registry::{ComponentRegistry, RegistryError};
use crate::storage::{Storage, StorageError, render_template};

/// Log target for session assembly.
pub const SESSION_TARGET: &str = "scionlabd::session";

/// Upper bound on files in an imported configuration directory.
pub const CONFIGURATION_FILE_LIMIT: usize = 100;

/// Topology file every SCION configuration directory must carry.
pub const TOPOLOGY_FILE: &str = "topology.json";

const TOPOLOGY_PATH: &str = "config/topology.json";
const VPN_CONFIG_PATTERN: &str = r"^client.*\.conf$";
const LOCAL_ISD_AS: &str = "1-ff00:0:1";

/// Errors raised while assembling a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration directory holds suspiciously many files.
    #[error(
        "configuration directory '{path}' holds {count} files (limit {limit}); was the right directory chosen?"
    )]
    TooManyFiles {
        /// Directory that was rejected.
        path: Utf8PathBuf,
        /// Files found.
        count: usize,
        /// Allowed maximum.
        limit: usize,
    },
    /// The configuration directory has no topology file.
    #[error("configuration directory '{path}' has no topology.json")]
    MissingTopology {
        /// Directory that was rejected.
        path: Utf8PathBuf,
    },
    /// Staging files failed.
    #[error("failed to stage session files: {source}")]
    Storage {
        /// Underlying storage error.
        #[from]
        source: StorageError,
    },
    /// Registering a component failed.
    #[error("failed to register component: {source}")]
    Registry {
        /// Underlying registry error.
        #[from]
        source: RegistryError,
    },
    /// The VPN configuration pattern failed to compile.
    #[error("failed to search for a VPN configuration: {source}")]
    Pattern {
        /// Underlying pattern error.
        #[from]
        source: ProcessError,
    },
}

/// Which optional parts a session includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPlan {
    /// SCION configuration directory to import.
    pub configuration_directory: Option<Utf8PathBuf>,
    /// OpenVPN client configuration.
    pub vpn_config: Option<Utf8PathBuf>,
    /// Remote address pinged with SCMP echo requests.
    pub ping_address: Option<String>,
}

impl SessionPlan {
    /// Reads the plan from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            configuration_directory: config.configuration_directory.clone(),
            vpn_config: config.vpn_config.clone(),
            ping_address: config.ping_address.clone(),
        }
    }
}

/// Copies a SCION configuration directory into storage.
///
/// The previous configuration is replaced. Returns the OpenVPN client
/// configuration found among the imported files, if any.
///
/// # Errors
///
/// Returns [`SessionError::TooManyFiles`] when the directory holds more than
/// [`CONFIGURATION_FILE_LIMIT`] files, [`SessionError::MissingTopology`] when
/// it lacks a topology file, and [`SessionError::Storage`] when copying fails.
pub fn import_configuration(
    storage: &Storage,
    source: &Utf8Path,
) -> Result<Option<Utf8PathBuf>, SessionError> {
    let count = storage.count_files_in_directory(source)?;
    if count > CONFIGURATION_FILE_LIMIT {
        return Err(SessionError::TooManyFiles {
            path: source.to_path_buf(),
            count,
            limit: CONFIGURATION_FILE_LIMIT,
        });
    }
    if !source.join(TOPOLOGY_FILE).is_file() {
        return Err(SessionError::MissingTopology {
            path: source.to_path_buf(),
        });
    }

    storage.delete_file_or_directory(CONFIG_DIRECTORY)?;
    let destination = storage.copy_file_or_directory(source, CONFIG_DIRECTORY)?;
    info!(
        target: SESSION_TARGET,
        source = %source,
        destination = %destination,
        files = count,
        "imported SCION configuration"
    );

    let pattern = compile_pattern(VPN_CONFIG_PATTERN)?;
    Ok(storage.find_in_directory(CONFIG_DIRECTORY, &pattern)?)
}

/// Stages the configuration the plan needs.
///
/// An imported directory replaces the staged configuration. Without one, a
/// previously imported configuration is kept and a bundled local topology is
/// written only when none exists. Returns the VPN configuration to use.
///
/// # Errors
///
/// Propagates [`import_configuration`] failures and storage errors.
pub fn prepare_session(
    storage: &Storage,
    plan: &SessionPlan,
) -> Result<Option<Utf8PathBuf>, SessionError> {
    let discovered = match &plan.configuration_directory {
        Some(source) => import_configuration(storage, source)?,
        None => {
            write_local_topology(storage)?;
            None
        }
    };
    Ok(plan.vpn_config.clone().or(discovered))
}

fn write_local_topology(storage: &Storage) -> Result<(), SessionError> {
    if storage.absolute_path(TOPOLOGY_PATH)?.is_file() {
        return Ok(());
    }
    warn!(
        target: SESSION_TARGET,
        isd_as = LOCAL_ISD_AS,
        "no SCION configuration imported, writing a local-only topology"
    );
    let topology = render_template(
        storage.read_asset_file(TOPOLOGY_FILE)?,
        &[("isd_as", LOCAL_ISD_AS)],
    );
    storage.write_file(TOPOLOGY_PATH, &topology)?;
    Ok(())
}

/// Builds the registry for a session.
///
/// The dispatcher, daemon, control server, and border router are always
/// registered. The VPN client needs `vpn_config` and the ping needs a
/// ping address in `plan`.
///
/// # Errors
///
/// Returns [`SessionError::Registry`] if a kind would be registered twice.
pub fn build_registry(
    runtime: RuntimeContext,
    plan: &SessionPlan,
    vpn_config: Option<Utf8PathBuf>,
    observer: impl StateObserver + 'static,
) -> Result<ComponentRegistry, SessionError> {
    let registry = ComponentRegistry::new(runtime, observer);
    registry.register(Dispatcher)?;
    if let Some(config) = vpn_config {
        registry.register(VpnClient::new(config))?;
    }
    registry.register(Daemon)?;
    registry.register(ControlServer)?;
    registry.register(BorderRouter)?;
    if let Some(address) = &plan.ping_address {
        registry.register(Scmp::new(address.clone()))?;
    }
    info!(
        target: SESSION_TARGET,
        components = ?registry.kinds(),
        "session registry built"
    );
    Ok(registry)
}
