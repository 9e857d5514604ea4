//! Connection detection for an un-instrumented `autossh` process.
//!
//! There is no authoritative signal for "the tunnel is up" without modifying
//! the supervised binary, so the probe layers three heuristics and stops at
//! the first positive one:
//!
//! 1. [`DetectionMethod::ForwardSignature`]: a supervisor process whose command
//!    line carries `-D` bound to a loopback address
//! 2. [`DetectionMethod::SupervisorName`]: any process named like the supervisor
//! 3. [`DetectionMethod::SocketListener`]: an ssh-family process listening on
//!    the configured local port
//!
//! Each OS query is bounded by a timeout. A failed query counts as "no match"
//! for its layer only. Every verdict is logged with the method that decided it.

use crate::metrics::Metrics;
use crate::models::Configuration;
use crate::services::host::{Host, HostError, ProcessInfo, SocketListener};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Which layer of the probe produced a positive result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    ForwardSignature,
    SupervisorName,
    SocketListener,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::ForwardSignature => write!(f, "dynamic-forward signature"),
            DetectionMethod::SupervisorName => write!(f, "supervisor process name"),
            DetectionMethod::SocketListener => write!(f, "ssh listener on local port"),
        }
    }
}

/// Outcome of one probe, with the reasoning kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub connected: bool,
    pub method: Option<DetectionMethod>,
    pub detail: String,
}

impl ProbeReport {
    fn connected(method: DetectionMethod, detail: String) -> Self {
        Self {
            connected: true,
            method: Some(method),
            detail,
        }
    }

    fn disconnected(detail: String) -> Self {
        Self {
            connected: false,
            method: None,
            detail,
        }
    }
}

/// Side-effect-free check of whether a tunnel is running
pub struct ConnectionProbe {
    host: Arc<dyn Host>,
    query_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ConnectionProbe {
    pub fn new(host: Arc<dyn Host>, query_timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            host,
            query_timeout,
            metrics,
        }
    }

    /// `true` if any detection layer finds the tunnel
    pub async fn is_connected(&self, config: &Configuration) -> bool {
        self.probe(config).await.connected
    }

    /// Run the layered detection and return the full verdict
    pub async fn probe(&self, config: &Configuration) -> ProbeReport {
        let report = self.detect(config).await;

        match report.method {
            Some(method) => {
                self.metrics.record_probe_hit(method);
                tracing::debug!("VPN connected: {} ({})", method, report.detail);
            }
            None => {
                self.metrics.record_probe_miss();
                tracing::debug!("VPN disconnected: {}", report.detail);
            }
        }

        report
    }

    async fn detect(&self, config: &Configuration) -> ProbeReport {
        let supervisor = config.supervisor_name();

        if let Some(processes) = self.query("process list", self.host.processes()).await {
            if let Some(process) = find_forwarding_process(&processes, supervisor) {
                return ProbeReport::connected(
                    DetectionMethod::ForwardSignature,
                    format!("pid {} `{}`", process.pid, process.command),
                );
            }

            if let Some(process) = processes.iter().find(|p| p.name() == supervisor) {
                return ProbeReport::connected(
                    DetectionMethod::SupervisorName,
                    format!("pid {} named {}", process.pid, supervisor),
                );
            }
        }

        let port = config.local_port;
        let Some(listeners) = self
            .query("socket listeners", self.host.tcp_listeners(port))
            .await
        else {
            return ProbeReport::disconnected(format!(
                "no {} process found and listeners on port {} could not be queried",
                supervisor, port
            ));
        };

        if listeners.is_empty() {
            return ProbeReport::disconnected(format!(
                "no {} process or listener on port {}",
                supervisor, port
            ));
        }

        if let Some(listener) = listeners.iter().find(|l| is_ssh_family(l)) {
            return ProbeReport::connected(
                DetectionMethod::SocketListener,
                format!("{} (pid {}) listening on port {}", listener.command, listener.pid, port),
            );
        }

        let owners: Vec<&str> = listeners.iter().map(|l| l.command.as_str()).collect();
        tracing::info!(
            "Listener on port {} is not SSH ({}), ignoring",
            port,
            owners.join(", ")
        );
        ProbeReport::disconnected(format!(
            "port {} is held by {}, not ssh",
            port,
            owners.join(", ")
        ))
    }

    /// Run one OS query under the timeout; failures are logged and become `None`
    async fn query<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, HostError>>,
    ) -> Option<T> {
        let result = timeout(self.query_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(HostError::Timeout {
                    command: what.to_string(),
                    after: self.query_timeout,
                })
            });

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.record_probe_query_failure();
                tracing::warn!("Probe could not query {}: {}", what, e);
                None
            }
        }
    }
}

/// Regex for `<supervisor> ... -D <loopback>` on a full command line
fn forward_signature(supervisor: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(^|/|\s){}\s.*-D\s*(localhost|127\.0\.0\.1|\[::1\])",
        regex::escape(supervisor)
    ))
}

fn find_forwarding_process<'a>(
    processes: &'a [ProcessInfo],
    supervisor: &str,
) -> Option<&'a ProcessInfo> {
    let signature = match forward_signature(supervisor) {
        Ok(signature) => signature,
        Err(e) => {
            tracing::warn!("Skipping signature check for {}: {}", supervisor, e);
            return None;
        }
    };
    processes.iter().find(|p| signature.is_match(&p.command))
}

fn is_ssh_family(listener: &SocketListener) -> bool {
    listener.command.to_lowercase().contains("ssh")
}
