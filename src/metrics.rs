// Controller metrics
//
// Lightweight counters for diagnosing flaky detection and failed transitions.
// Logged as a summary on shutdown.

use crate::services::probe::DetectionMethod;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters shared by the probe, the supervisor and the controller
#[derive(Debug)]
pub struct Metrics {
    /// Connect attempts that reached the launch step
    pub connects_started: AtomicU64,

    /// Connect attempts that failed (unknown profile, launch or proxy)
    pub connects_failed: AtomicU64,

    /// Completed disconnect transitions
    pub disconnects: AtomicU64,

    /// Processes that survived SIGTERM and were sent SIGKILL
    pub kill_escalations: AtomicU64,

    /// Probe verdicts by the layer that matched
    pub probe_forward_signature: AtomicU64,
    pub probe_supervisor_name: AtomicU64,
    pub probe_socket_listener: AtomicU64,

    /// Probe verdicts that found nothing
    pub probe_misses: AtomicU64,

    /// OS queries made by the probe that failed or timed out
    pub probe_query_failures: AtomicU64,

    /// Successful configuration reloads
    pub config_reloads: AtomicU64,

    /// Intents dropped because the queue was full or a duplicate was in flight
    pub intents_dropped: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connects_started: AtomicU64::new(0),
            connects_failed: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            kill_escalations: AtomicU64::new(0),
            probe_forward_signature: AtomicU64::new(0),
            probe_supervisor_name: AtomicU64::new(0),
            probe_socket_listener: AtomicU64::new(0),
            probe_misses: AtomicU64::new(0),
            probe_query_failures: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
            intents_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_connect_started(&self) {
        self.connects_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failed(&self) {
        self.connects_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kill_escalation(&self) {
        self.kill_escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_hit(&self, method: DetectionMethod) {
        let counter = match method {
            DetectionMethod::ForwardSignature => &self.probe_forward_signature,
            DetectionMethod::SupervisorName => &self.probe_supervisor_name,
            DetectionMethod::SocketListener => &self.probe_socket_listener,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_miss(&self) {
        self.probe_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_query_failure(&self) {
        self.probe_query_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_reload(&self) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_dropped(&self) {
        self.intents_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Total probe verdicts, positive and negative
    pub fn probes(&self) -> u64 {
        self.probe_forward_signature.load(Ordering::Relaxed)
            + self.probe_supervisor_name.load(Ordering::Relaxed)
            + self.probe_socket_listener.load(Ordering::Relaxed)
            + self.probe_misses.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Controller Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Connects: {} started, {} failed; disconnects: {}, SIGKILL escalations: {}",
            self.connects_started.load(Ordering::Relaxed),
            self.connects_failed.load(Ordering::Relaxed),
            self.disconnects.load(Ordering::Relaxed),
            self.kill_escalations.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Probes: {} total ({} signature, {} name, {} listener, {} miss), {} query failures",
            self.probes(),
            self.probe_forward_signature.load(Ordering::Relaxed),
            self.probe_supervisor_name.load(Ordering::Relaxed),
            self.probe_socket_listener.load(Ordering::Relaxed),
            self.probe_misses.load(Ordering::Relaxed),
            self.probe_query_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Config reloads: {}, dropped intents: {}",
            self.config_reloads.load(Ordering::Relaxed),
            self.intents_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
