// socksvpn - controller for an autossh SOCKS tunnel
//
// This is the library crate containing the connection lifecycle logic.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigStore, ConfigWatcher};
pub use metrics::Metrics;
pub use models::{AppState, ConnectionState, Configuration, ServerProfile, Timings};
pub use state::{StateChange, StateManager};
pub use ui::{AppController, Intent, IntentBridge, PresentationSink};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
