//! Services module - the connection lifecycle controller.
//!
//! Everything here is framework-agnostic: no presentation code, only the
//! logic that drives and observes the `autossh` tunnel.
//!
//! # Components
//!
//! - [`Host`]: the OS process boundary (`ps`, `lsof`, `kill`, `networksetup`).
//!   [`SystemHost`] is the real implementation; tests use fakes.
//! - [`ConnectionProbe`]: layered, side-effect-free detection of a running
//!   tunnel. See the module docs of [`probe`] for the three layers.
//! - [`TunnelSupervisor`]: connect/disconnect transitions, including the
//!   SOCKS proxy toggle and SIGTERM → SIGKILL escalation.
//! - [`StatusReconciler`]: periodic re-probe that republishes state, plus
//!   [`settle_disconnect`] for the bounded wait after a user disconnect.
//! - [`EditorLauncher`]: opens the configuration file for editing.
//!
//! # Usage Example
//!
//! ```ignore
//! use socksvpn::services::{ConnectionProbe, SystemHost, TunnelSupervisor};
//!
//! let host: Arc<dyn Host> = Arc::new(SystemHost::new());
//! let supervisor = TunnelSupervisor::new(host.clone(), timings.kill_grace, metrics.clone());
//! let probe = ConnectionProbe::new(host, timings.query_timeout, metrics);
//!
//! supervisor.connect(&config, "office").await?;
//! let up = probe.is_connected(&config).await;
//! ```

pub mod editor;
pub mod host;
pub mod probe;
pub mod reconciler;
pub mod supervisor;

pub use editor::{EditorLauncher, SystemEditor};
pub use host::{Host, HostError, ProcessInfo, Signal, SocketListener, SystemHost};
pub use probe::{ConnectionProbe, DetectionMethod, ProbeReport};
pub use reconciler::{SettleOutcome, StatusReconciler, settle_disconnect};
pub use supervisor::{PROXY_HOST, ProxyAction, TunnelError, TunnelSupervisor};
