// Status reconciliation
//
// Re-derives the connection state on a fixed interval, independent of user
// actions, and publishes it. Also holds the bounded post-disconnect settle
// loop used by the controller.

use crate::models::Configuration;
use crate::services::probe::ConnectionProbe;
use crate::state::StateManager;
use crate::ui::PresentationSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Result of waiting for a disconnect to show up in the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The probe reported Disconnected within the bound
    Settled,
    /// The bound passed while the probe still saw a tunnel
    TimedOut,
}

/// Periodic probe → state → sink loop
pub struct StatusReconciler {
    probe: Arc<ConnectionProbe>,
    state: Arc<StateManager>,
    sink: Arc<dyn PresentationSink>,
    interval: Duration,
}

impl StatusReconciler {
    pub fn new(
        probe: Arc<ConnectionProbe>,
        state: Arc<StateManager>,
        sink: Arc<dyn PresentationSink>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            state,
            sink,
            interval,
        }
    }

    /// Probe once and publish the result
    pub async fn reconcile_once(&self) -> bool {
        let config = self.state.config();
        let connected = self.probe.is_connected(&config).await;
        publish(&self.state, self.sink.as_ref(), connected);
        connected
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// The first reconciliation happens immediately. A probe never fails, so
    /// nothing inside the loop can end it early.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Status reconciler started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Status reconciler stopped");
    }
}

/// Record a probe result in the state manager and push it to the sink
pub fn publish(state: &StateManager, sink: &dyn PresentationSink, connected: bool) {
    state.set_connected(connected);
    sink.set_connected(connected);
}

/// Poll the probe until it reports Disconnected, at most `attempts` times.
///
/// Absorbs the latency between signalling autossh and its SOCKS listener
/// going away. The probe runs at least once, and there is no sleep after the
/// last attempt. Running out of attempts is not an error; the caller keeps
/// whatever the probe said last.
pub async fn settle_disconnect(
    probe: &ConnectionProbe,
    config: &Configuration,
    interval: Duration,
    attempts: u32,
) -> SettleOutcome {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if !probe.is_connected(config).await {
            tracing::debug!("Disconnect settled after {} probe(s)", attempt);
            return SettleOutcome::Settled;
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    tracing::warn!(
        "Tunnel still detected after {} probes ({:?} apart); reporting disconnect as complete",
        attempts,
        interval
    );
    SettleOutcome::TimedOut
}
