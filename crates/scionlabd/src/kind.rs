//! Component kinds and the states they move through.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Roles in a local SCION AS stack, one supervised process each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    /// Relays packets between local SCION applications and the network.
    Dispatcher,
    /// Forwards SCION packets across the AS boundary.
    BorderRouter,
    /// Runs beaconing, path registration, and the trust store.
    ControlServer,
    /// End-host daemon (`sciond`) answering path lookups.
    Daemon,
    /// Tunnel connecting the AS to its attachment point.
    VpnClient,
    /// SCMP echo requests used as a connectivity check.
    Scmp,
}

impl ComponentKind {
    /// Every kind in dependency-friendly order.
    pub const ALL: [Self; 6] = [
        Self::Dispatcher,
        Self::VpnClient,
        Self::Daemon,
        Self::ControlServer,
        Self::BorderRouter,
        Self::Scmp,
    ];

    /// Stable identifier used in logs and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatcher => "dispatcher",
            Self::BorderRouter => "border_router",
            Self::ControlServer => "control_server",
            Self::Daemon => "daemon",
            Self::VpnClient => "vpn_client",
            Self::Scmp => "scmp",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing a component kind fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown component kind: {0}")]
pub struct ComponentKindParseError(String);

impl ComponentKindParseError {
    /// Creates a parse error describing the rejected value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The value that could not be parsed.
    #[must_use]
    pub fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for ComponentKind {
    type Err = ComponentKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalised)
            .ok_or_else(|| ComponentKindParseError::new(value))
    }
}

/// Lifecycle state of one supervised component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    /// No supervising thread is alive.
    #[default]
    Stopped,
    /// A supervising thread is alive and readiness has not been observed.
    Starting,
    /// The readiness pattern matched during the current run.
    Ready,
}

/// Coarse health, reported per component and for the whole stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Nothing is running.
    #[default]
    Stopped,
    /// Work is under way but not everything is ready.
    Starting,
    /// Everything reported ready and healthy.
    Healthy,
    /// Something that was started is not behaving.
    Unhealthy,
}

impl HealthStatus {
    /// Lower-case label used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
        };
        formatter.write_str(label)
    }
}
