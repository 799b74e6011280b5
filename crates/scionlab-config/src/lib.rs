//! Shared configuration for the SCIONLab stack supervisor.
//!
//! Values are layered by [`ortho_config`]: built-in defaults first, then an
//! optional TOML file (`--config-path` or `SCIONLAB_CONFIG_PATH`), then
//! `SCIONLAB_*` environment variables, and finally command-line flags. Later
//! layers win.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_LOG_POLL_INTERVAL_MS, DEFAULT_READY_INTERVAL_MS,
    DEFAULT_READY_RETRIES, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_VPN_BINARY,
    STORAGE_DIRECTORY_NAME, default_log_filter, default_log_filter_string, default_log_format,
    default_storage_root, default_vpn_binary,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "SCIONLAB")]
pub struct Config {
    /// Root directory for staged configuration, sockets, logs, and databases.
    #[ortho_config(default = defaults::default_storage_root())]
    pub storage_root: Utf8PathBuf,
    /// Multi-call SCION binary providing the dispatcher, router, and services.
    pub scion_binary: Option<Utf8PathBuf>,
    /// Executable used for the VPN client component.
    #[ortho_config(default = defaults::default_vpn_binary())]
    pub vpn_binary: Utf8PathBuf,
    /// User-supplied SCION configuration directory (`topology.json`, certs, keys).
    pub configuration_directory: Option<Utf8PathBuf>,
    /// OpenVPN client configuration; the VPN client is omitted without it.
    pub vpn_config: Option<Utf8PathBuf>,
    /// SCION address pinged by the diagnostic component; omitted without it.
    pub ping_address: Option<String>,
    /// Interval between dependency readiness polls, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_READY_INTERVAL_MS)]
    pub ready_interval_ms: u64,
    /// Number of dependency polls before a start attempt is abandoned.
    #[ortho_config(default = defaults::DEFAULT_READY_RETRIES)]
    pub ready_retries: u32,
    /// Interval between reads of side-channel log files, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_LOG_POLL_INTERVAL_MS)]
    pub log_poll_interval_ms: u64,
    /// Budget for all components to stop after shutdown, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_SHUTDOWN_TIMEOUT_MS)]
    pub shutdown_timeout_ms: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log events.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            scion_binary: None,
            vpn_binary: default_vpn_binary(),
            configuration_directory: None,
            vpn_config: None,
            ping_address: None,
            ready_interval_ms: DEFAULT_READY_INTERVAL_MS,
            ready_retries: DEFAULT_READY_RETRIES,
            log_poll_interval_ms: DEFAULT_LOG_POLL_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the program name, as with
    /// [`std::env::args_os`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Root directory for runtime artefacts.
    #[must_use]
    pub fn storage_root(&self) -> &Utf8Path {
        self.storage_root.as_path()
    }

    /// SCION binary, when configured.
    #[must_use]
    pub fn scion_binary(&self) -> Option<&Utf8Path> {
        self.scion_binary.as_deref()
    }

    /// VPN client executable.
    #[must_use]
    pub fn vpn_binary(&self) -> &Utf8Path {
        self.vpn_binary.as_path()
    }

    /// Dependency poll interval.
    #[must_use]
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    /// Dependency poll budget.
    #[must_use]
    pub fn ready_retries(&self) -> u32 {
        self.ready_retries
    }

    /// Side-channel log poll interval.
    #[must_use]
    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    /// Shutdown budget.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for log events.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn default_config_uses_documented_timing() {
        let config = Config::default();

        assert_eq!(config.ready_interval(), Duration::from_millis(250));
        assert_eq!(config.ready_retries(), 120);
        assert_eq!(config.log_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
    }

    #[rstest]
    fn default_storage_root_ends_with_directory_name() {
        let config = Config::default();

        assert_eq!(config.storage_root().file_name(), Some(STORAGE_DIRECTORY_NAME));
    }

    #[rstest]
    fn default_config_has_no_optional_components() {
        let config = Config::default();

        assert!(config.scion_binary().is_none());
        assert!(config.vpn_config.is_none());
        assert!(config.ping_address.is_none());
        assert_eq!(config.vpn_binary(), Utf8Path::new("openvpn"));
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("Compact", LogFormat::Compact)]
    #[case("COMPACT", LogFormat::Compact)]
    fn parses_log_format_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        let parsed: LogFormat = input.parse().expect("log format should parse");

        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn rejects_unknown_log_format() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[rstest]
    fn only_json_is_structured() {
        assert!(LogFormat::Json.is_structured());
        assert!(!LogFormat::Compact.is_structured());
    }
}
