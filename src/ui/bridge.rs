// IntentBridge - hands user intents from presentation threads to the runtime
//
// Presentation code (the console reader thread, a tray callback) runs outside
// tokio. The bridge gives it a non-blocking submit() backed by a bounded
// channel that the controller's dispatch loop drains.

use crate::metrics::Metrics;
use crate::models::Action;
use crate::state::StateManager;
use crate::ui::Intent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the intent queue
pub const INTENT_QUEUE_CAPACITY: usize = 100;

/// Cloneable, non-blocking sender of [`Intent`]s.
///
/// A Disconnect submitted while another Disconnect is still running is
/// dropped, the same as a greyed-out menu item.
#[derive(Clone)]
pub struct IntentBridge {
    tx: mpsc::Sender<Intent>,
    state: Arc<StateManager>,
    metrics: Arc<Metrics>,
}

impl IntentBridge {
    /// Create a bridge and the receiver the dispatch loop reads from
    pub fn channel(
        state: Arc<StateManager>,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::Receiver<Intent>) {
        let (tx, rx) = mpsc::channel(INTENT_QUEUE_CAPACITY);
        (Self { tx, state, metrics }, rx)
    }

    /// Queue an intent without blocking.
    ///
    /// Safe to call from any thread. Returns `false` if the intent was
    /// dropped.
    pub fn submit(&self, intent: Intent) -> bool {
        if intent == Intent::Disconnect
            && self
                .state
                .read(|state| state.in_flight == Some(Action::Disconnect))
        {
            tracing::info!("Disconnect already in progress - ignoring request");
            self.metrics.record_intent_dropped();
            return false;
        }

        match self.tx.try_send(intent) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(intent)) => {
                tracing::warn!("Intent queue full - dropping '{}'", intent);
                self.metrics.record_intent_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(intent)) => {
                tracing::warn!("Failed to send '{}' - dispatch loop has stopped", intent);
                self.metrics.record_intent_dropped();
                false
            }
        }
    }

    /// `true` once the dispatch loop has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
