// State management module
//
// StateManager wraps AppState in Arc<RwLock<T>> and emits change events so
// the presentation side never has to poll.

use crate::models::{Action, AppState, ConnectionState, Configuration};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The probe reported a different connection state
    ConnectionChanged { connected: bool },

    /// A new configuration snapshot was installed
    ConfigurationReloaded { profiles: usize },

    /// A user-initiated transition began
    ActionStarted { action: Action },

    /// A user-initiated transition ended, with its one-line error if it failed
    ActionFinished {
        action: Action,
        error: Option<String>,
    },

    /// The profile of the running tunnel was set or cleared
    ActiveProfileChanged { profile: Option<String> },
}

/// Thread-safe state manager with event emission.
///
/// Readers always get a complete snapshot: the configuration is an
/// `Arc<Configuration>` swapped as a whole, and every mutation goes through
/// [`update()`](Self::update) under the write lock.
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`StateChange`]: Event types emitted on state mutations
/// - [`crate::ui::AppController`]: Primary writer
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event buffer
    pub fn new() -> Self {
        Self::with_config(Configuration::default())
    }

    pub fn with_config(config: Configuration) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        let state = AppState {
            config: Arc::new(config),
            ..AppState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            state_tx,
        }
    }

    // A panic while holding the lock cannot leave AppState half-written:
    // update() applies its closure to the guarded value in one step.
    fn read_guard(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the whole state, safe to hold without locks
    pub fn snapshot(&self) -> AppState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_busy());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.read_guard();
        f(&state)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<Configuration> {
        self.read(|state| Arc::clone(&state.config))
    }

    /// Update the state and emit change events.
    ///
    /// Returns the events that were emitted, in order.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to all future state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if !Arc::ptr_eq(&old.config, &new.config) {
            changes.push(StateChange::ConfigurationReloaded {
                profiles: new.config.profile_count(),
            });
        }

        if old.connection != new.connection {
            changes.push(StateChange::ConnectionChanged {
                connected: new.connection.is_connected(),
            });
        }

        match (&old.in_flight, &new.in_flight) {
            (None, Some(action)) => changes.push(StateChange::ActionStarted {
                action: action.clone(),
            }),
            (Some(action), None) => changes.push(StateChange::ActionFinished {
                action: action.clone(),
                error: new.last_error.clone(),
            }),
            (Some(old_action), Some(new_action)) if old_action != new_action => {
                changes.push(StateChange::ActionFinished {
                    action: old_action.clone(),
                    error: new.last_error.clone(),
                });
                changes.push(StateChange::ActionStarted {
                    action: new_action.clone(),
                });
            }
            _ => {}
        }

        if old.active_profile != new.active_profile {
            changes.push(StateChange::ActiveProfileChanged {
                profile: new.active_profile.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Install a freshly loaded configuration snapshot
    pub fn set_config(&self, config: Configuration) -> Vec<StateChange> {
        let config = Arc::new(config);
        self.update(|state| {
            let vanished = state
                .active_profile
                .as_deref()
                .is_some_and(|active| config.profile(active).is_none());
            if vanished {
                tracing::info!("Active profile no longer in configuration");
                state.active_profile = None;
            }
            state.config = config;
        })
    }

    /// Record the probe's latest verdict
    pub fn set_connected(&self, connected: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.connection = ConnectionState::from(connected);
            if !connected {
                state.active_profile = None;
            }
        })
    }

    /// Mark a transition as running.
    ///
    /// Returns `false` without changing anything if another transition is
    /// already in flight.
    pub fn begin_action(&self, action: Action) -> bool {
        let mut started = false;
        self.update(|state| {
            if state.in_flight.is_none() {
                state.in_flight = Some(action);
                state.last_error = None;
                started = true;
            }
        });
        started
    }

    /// Mark the running transition as done
    pub fn finish_action(&self, error: Option<String>) -> Vec<StateChange> {
        self.update(|state| {
            if error.is_none() {
                if let Some(Action::Connect(profile)) = &state.in_flight {
                    state.active_profile = Some(profile.clone());
                }
            }
            state.in_flight = None;
            state.last_error = error;
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
