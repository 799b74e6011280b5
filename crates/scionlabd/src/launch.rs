//! Session lifecycle for the supervisor binary.

use std::sync::Arc;

use ortho_config::OrthoError;
use scionlab_config::Config;
use thiserror::Error;
use tracing::{info, warn};

use crate::component::RuntimeContext;
use crate::lifecycle::{LifecycleReporter, StructuredLifecycleReporter};
use crate::observer::{LoggingStateObserver, StateObserver};
use crate::session::{SessionError, SessionPlan, build_registry, prepare_session};
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use crate::telemetry::{self, TelemetryError};

/// Log target for the launcher.
pub const LAUNCH_TARGET: &str = "scionlabd::launch";

/// Errors that end the supervisor before or during a session.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry could not be installed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The session could not be assembled.
    #[error("failed to assemble session: {source}")]
    Session {
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("failed to wait for shutdown: {source}")]
    Shutdown {
        /// Underlying listener error.
        #[source]
        source: ShutdownError,
    },
}

/// Loads configuration from the process environment and runs one session
/// until a termination signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, telemetry, or session setup
/// fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let config = Config::load().map_err(|source| LaunchError::Config { source })?;
    telemetry::initialise(&config).map_err(|source| LaunchError::Telemetry { source })?;
    run_session(
        &config,
        Arc::new(StructuredLifecycleReporter::new()),
        LoggingStateObserver,
        &SystemShutdownSignal,
    )
}

/// Runs one session with injected collaborators.
///
/// Components are started in registration order; individual start failures
/// are logged and do not end the session. Once `shutdown` returns, every
/// component is stopped and given the configured shutdown budget to exit.
///
/// # Errors
///
/// Returns [`LaunchError::Session`] when staging or registration fails and
/// [`LaunchError::Shutdown`] when the shutdown listener fails. Components are
/// stopped before the latter is returned.
pub fn run_session(
    config: &Config,
    reporter: Arc<dyn LifecycleReporter>,
    observer: impl StateObserver + 'static,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let runtime = RuntimeContext::from_config(config, reporter);
    log_scion_version(&runtime);

    let plan = SessionPlan::from_config(config);
    let vpn_config = prepare_session(runtime.storage(), &plan)
        .map_err(|source| LaunchError::Session { source })?;
    let registry = build_registry(runtime, &plan, vpn_config, observer)
        .map_err(|source| LaunchError::Session { source })?;

    let failures = registry.start_all();
    info!(
        target: LAUNCH_TARGET,
        components = registry.kinds().len(),
        failed = failures.len(),
        "session started"
    );

    let waited = shutdown.wait();
    registry.stop_all();
    if !registry.wait_until_stopped(config.shutdown_timeout()) {
        warn!(target: LAUNCH_TARGET, "session ended with components still running");
    }
    info!(target: LAUNCH_TARGET, "session ended");
    waited.map_err(|source| LaunchError::Shutdown { source })
}

fn log_scion_version(runtime: &RuntimeContext) {
    let Some(binary) = runtime.scion_binary() else {
        warn!(
            target: LAUNCH_TARGET,
            "no SCION binary configured; components will refuse to start"
        );
        return;
    };
    match scionlab_process::version(binary) {
        Ok(version) => info!(target: LAUNCH_TARGET, binary = %binary, %version, "using SCION binary"),
        Err(error) => warn!(
            target: LAUNCH_TARGET,
            binary = %binary,
            error = %error,
            "could not query SCION version"
        ),
    }
}
