//! Data models for socksvpn.
//!
//! - [`Configuration`]: validated `~/.vpn.json` contents with defaults applied
//! - [`ConfigFile`]: the raw JSON shape, used for parsing and for writing templates
//! - [`ServerProfile`] / [`TunnelOptions`]: a named server and its keepalive options
//! - [`AppState`]: controller state held by [`StateManager`](crate::state::StateManager)
//! - [`Timings`]: intervals and bounds of the polling loops

pub mod app_state;
pub mod config;

pub use app_state::{Action, AppState, ConnectionState, Timings};
pub use config::{CommandEntry, ConfigFile, Configuration, ServerOptionsFile, ServerProfile, TunnelOptions};
