use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::config::Configuration;

/// Observed state of the tunnel. Always re-derived by the probe, never cached
/// as the truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl From<bool> for ConnectionState {
    fn from(connected: bool) -> Self {
        if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// A user-initiated transition that is currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect(String),
    Disconnect,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Connect(profile) => write!(f, "connect to {}", profile),
            Action::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Intervals and bounds of every polling loop.
///
/// Kept together so tests can shrink them instead of waiting on real
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Period of the background status reconciler
    pub reconcile_interval: Duration,

    /// Delay between probes while waiting for a disconnect to settle
    pub settle_interval: Duration,

    /// Number of probes before a disconnect is reported as unsettled
    pub settle_attempts: u32,

    /// Delay between SIGTERM and the re-check that decides on SIGKILL
    pub kill_grace: Duration,

    /// Upper bound on each OS query made by the probe
    pub query_timeout: Duration,

    /// Period of the configuration file modification-time check
    pub watch_interval: Duration,

    /// How long the configuration watcher keeps polling before giving up
    pub watch_limit: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
            settle_interval: Duration::from_millis(250),
            settle_attempts: 20,
            kill_grace: Duration::from_millis(200),
            query_timeout: Duration::from_secs(5),
            watch_interval: Duration::from_secs(2),
            watch_limit: Duration::from_secs(5 * 60),
        }
    }
}

/// Single source of truth for controller state.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`];
/// never touch it directly.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// Active configuration snapshot, replaced wholesale on reload
    pub config: Arc<Configuration>,

    /// Last state reported by the probe
    pub connection: ConnectionState,

    /// Profile of the last successful connect, cleared on disconnect
    pub active_profile: Option<String>,

    /// Transition currently running, if any
    pub in_flight: Option<Action>,

    /// One-line description of the last failed action
    pub last_error: Option<String>,
}

impl AppState {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected_and_idle() {
        let state = AppState::default();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert!(!state.is_busy());
        assert!(state.active_profile.is_none());
        assert_eq!(state.config.local_port, 1234);
    }

    #[test]
    fn test_connection_state_from_bool() {
        assert_eq!(ConnectionState::from(true), ConnectionState::Connected);
        assert_eq!(ConnectionState::from(false), ConnectionState::Disconnected);
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn test_default_timings_match_menu_app() {
        let timings = Timings::default();
        assert_eq!(timings.reconcile_interval, Duration::from_secs(5));
        assert_eq!(timings.settle_interval * timings.settle_attempts, Duration::from_secs(5));
        assert_eq!(timings.watch_limit, Duration::from_secs(300));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Connect("office".to_string()).to_string(), "connect to office");
        assert_eq!(Action::Disconnect.to_string(), "disconnect");
    }
}
