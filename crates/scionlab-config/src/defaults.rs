//! Built-in values applied before files, environment, and CLI layers.

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Directory name appended to the platform data directory.
pub const STORAGE_DIRECTORY_NAME: &str = "scionlab";

/// Default polling interval while a component waits for its dependencies.
pub const DEFAULT_READY_INTERVAL_MS: u64 = 250;

/// Default number of dependency polls before a start attempt is abandoned.
pub const DEFAULT_READY_RETRIES: u32 = 120;

/// Default polling interval for side-channel log files.
pub const DEFAULT_LOG_POLL_INTERVAL_MS: u64 = 1_000;

/// Default budget for all components to stop after a shutdown request.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default OpenVPN executable, resolved through `PATH`.
pub const DEFAULT_VPN_BINARY: &str = "openvpn";

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default VPN client executable.
#[must_use]
pub fn default_vpn_binary() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_VPN_BINARY)
}

/// Computes the directory that holds staged configuration, sockets, and
/// databases for the supervised processes.
#[must_use]
pub fn default_storage_root() -> Utf8PathBuf {
    let mut base = data_base_directory();
    base.push(STORAGE_DIRECTORY_NAME);
    base
}

#[cfg(unix)]
fn data_base_directory() -> Utf8PathBuf {
    dirs::data_local_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory)
}

#[cfg(not(unix))]
fn data_base_directory() -> Utf8PathBuf {
    fallback_base_directory()
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
