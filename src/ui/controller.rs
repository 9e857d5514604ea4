// App Controller - owns every connect/disconnect/edit transition
//
// This module contains the AppController which coordinates between:
// - ConfigStore (the ~/.vpn.json file)
// - StateManager (configuration snapshot, last probe verdict, running action)
// - TunnelSupervisor and ConnectionProbe (OS side effects and detection)
// - PresentationSink (status rendering and notifications)
//
// All user intents go through one dispatch loop, so transitions never
// overlap. Background work is limited to the status reconciler, the state
// subscription that turns failures into notifications, and the config
// watcher started by Edit.

use crate::config::{ConfigError, ConfigStore, ConfigWatcher};
use crate::metrics::Metrics;
use crate::models::{Action, Configuration, ServerProfile, Timings};
use crate::services::reconciler::{self, SettleOutcome, StatusReconciler};
use crate::services::{
    ConnectionProbe, EditorLauncher, Host, ProbeReport, TunnelError, TunnelSupervisor,
};
use crate::state::{StateChange, StateManager};
use crate::ui::{Intent, IntentBridge, PresentationSink};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// What the dispatch loop does after handling an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owner of the controller's state and collaborators.
///
/// # Example
/// ```ignore
/// let controller = Arc::new(AppController::new(
///     ConfigStore::default_location()?,
///     Arc::new(SystemHost::new()),
///     Arc::new(ConsoleSink::stdout()),
///     Arc::new(SystemEditor::from_env()),
///     Timings::default(),
///     metrics,
/// ));
/// let (bridge, intents) = controller.intent_bridge();
/// // hand `bridge` to the presentation layer, then:
/// controller.run(intents).await;
/// ```
pub struct AppController {
    store: ConfigStore,
    state: Arc<StateManager>,
    supervisor: TunnelSupervisor,
    probe: Arc<ConnectionProbe>,
    sink: Arc<dyn PresentationSink>,
    editor: Arc<dyn EditorLauncher>,
    timings: Timings,
    metrics: Arc<Metrics>,

    /// Flipped to `true` once on quit; stops the reconciler and watchers
    shutdown_tx: watch::Sender<bool>,
}

impl AppController {
    /// Build the controller and load the configuration.
    ///
    /// A configuration that cannot be loaded is logged and replaced by the
    /// defaults with no servers, so Edit can still fix it.
    pub fn new(
        store: ConfigStore,
        host: Arc<dyn Host>,
        sink: Arc<dyn PresentationSink>,
        editor: Arc<dyn EditorLauncher>,
        timings: Timings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let config = Self::load_or_default(&store);
        let state = Arc::new(StateManager::with_config(config));
        let supervisor =
            TunnelSupervisor::new(Arc::clone(&host), timings.kill_grace, Arc::clone(&metrics));
        let probe = Arc::new(ConnectionProbe::new(
            host,
            timings.query_timeout,
            Arc::clone(&metrics),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!("Controller initialized for {}", store.path());

        Self {
            store,
            state,
            supervisor,
            probe,
            sink,
            editor,
            timings,
            metrics,
            shutdown_tx,
        }
    }

    /// Load the configuration, falling back to the defaults on any error
    pub fn load_or_default(store: &ConfigStore) -> Configuration {
        match store.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Warning: failed to load config: {}", e);
                tracing::warn!("Using default configuration. Use Edit to create or fix it.");
                Configuration::default()
            }
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<Configuration> {
        self.state.config()
    }

    /// Create the intent queue for a presentation layer
    pub fn intent_bridge(&self) -> (IntentBridge, mpsc::Receiver<Intent>) {
        IntentBridge::channel(Arc::clone(&self.state), Arc::clone(&self.metrics))
    }

    /// Push the current profile list to the sink
    pub fn publish_profiles(&self) {
        self.show_profiles(&self.state.config());
    }

    /// Push the profiles of a given configuration to the sink
    pub fn show_profiles(&self, config: &Configuration) {
        let profiles: Vec<ServerProfile> = config.profiles().cloned().collect();
        self.sink.set_profiles(&profiles);
    }

    /// Probe once and publish the verdict
    pub async fn refresh(&self) -> bool {
        self.status().await.connected
    }

    /// Probe once, publish the verdict and return the full report
    pub async fn status(&self) -> ProbeReport {
        let config = self.state.config();
        let report = self.probe.probe(&config).await;
        reconciler::publish(&self.state, self.sink.as_ref(), report.connected);
        report
    }

    /// Connect to a named server, replacing any running tunnel.
    ///
    /// An unknown name fails before any side effect and leaves the connection
    /// state as it was.
    pub async fn connect(&self, profile: &str) -> Result<(), TunnelError> {
        self.begin(Action::Connect(profile.to_string()));
        let config = self.state.config();

        let result = self.supervisor.connect(&config, profile).await;
        match &result {
            Err(e) if e.is_configuration_error() => {
                tracing::error!("Connect rejected: {}", e);
            }
            Err(e) => {
                tracing::error!("Connect to {} failed: {}", profile, e);
                self.refresh().await;
            }
            Ok(()) => {
                self.refresh().await;
            }
        }

        self.state
            .finish_action(result.as_ref().err().map(ToString::to_string));
        result
    }

    /// Disconnect and wait, bounded, for the probe to agree.
    ///
    /// The returned error is only ever a proxy-disable failure. Running out
    /// of settle attempts is reported as [`SettleOutcome::TimedOut`], not as
    /// an error.
    pub async fn disconnect(&self) -> Result<SettleOutcome, TunnelError> {
        self.begin(Action::Disconnect);
        let config = self.state.config();

        let result = self.supervisor.disconnect(&config).await;
        if let Err(e) = &result {
            tracing::error!("Disconnect: {}", e);
        }

        let outcome = reconciler::settle_disconnect(
            &self.probe,
            &config,
            self.timings.settle_interval,
            self.timings.settle_attempts,
        )
        .await;
        // A timed-out settle leaves whatever the probe last saw
        reconciler::publish(
            &self.state,
            self.sink.as_ref(),
            outcome == SettleOutcome::TimedOut,
        );

        self.state
            .finish_action(result.as_ref().err().map(ToString::to_string));
        result.map(|()| outcome)
    }

    /// Open the configuration file for editing and reload it once it changes.
    ///
    /// Creates the example configuration first if there is none. The returned
    /// task resolves to `true` if a change was seen and reloaded successfully.
    pub async fn edit(self: &Arc<Self>) -> Result<JoinHandle<bool>> {
        let created = self
            .store
            .ensure_exists()
            .context("Failed to create configuration file")?;
        if created {
            self.sink.notify(&format!(
                "Created example configuration at {}",
                self.store.path()
            ));
        }

        self.editor
            .open(self.store.path())
            .await
            .with_context(|| format!("Failed to open {}", self.store.path()))?;

        let watcher = ConfigWatcher::new(
            self.store.path(),
            self.timings.watch_interval,
            self.timings.watch_limit,
        );
        let shutdown = self.shutdown_tx.subscribe();
        let controller = Arc::clone(self);

        Ok(tokio::spawn(async move {
            match watcher.wait_for_change(shutdown).await {
                Some(_) => controller.reload().is_ok(),
                None => false,
            }
        }))
    }

    /// Re-read the configuration file and install it.
    ///
    /// On failure the previous configuration stays active.
    pub fn reload(&self) -> Result<Arc<Configuration>, ConfigError> {
        match self.store.reload() {
            Ok(config) => {
                self.state.set_config(config);
                self.metrics.record_config_reload();
                self.publish_profiles();
                Ok(self.state.config())
            }
            Err(e) => {
                tracing::error!("Failed to reload config: {}", e);
                self.sink
                    .notify(&format!("Failed to reload configuration: {}", e));
                Err(e)
            }
        }
    }

    /// Handle one intent. Failures are logged and surfaced through the state
    /// subscription; only Quit changes the flow.
    pub async fn handle(self: &Arc<Self>, intent: Intent) -> Flow {
        tracing::debug!("Handling intent: {}", intent);

        match intent {
            Intent::Connect { profile } => {
                let _ = self.connect(&profile).await;
            }
            Intent::Disconnect => {
                let _ = self.disconnect().await;
            }
            Intent::Edit => {
                if let Err(e) = self.edit().await {
                    tracing::error!("Edit failed: {:#}", e);
                    self.sink.notify(&format!("{:#}", e));
                }
            }
            Intent::Quit => return Flow::Quit,
        }

        Flow::Continue
    }

    /// Run the dispatch loop until Quit or until every intent sender is gone.
    ///
    /// Starts the status reconciler and the state subscription, and
    /// disconnects before returning.
    pub async fn run(self: Arc<Self>, mut intents: mpsc::Receiver<Intent>) {
        self.publish_profiles();

        let reconciler = StatusReconciler::new(
            Arc::clone(&self.probe),
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
            self.timings.reconcile_interval,
        );
        let reconciler = tokio::spawn(reconciler.run(self.shutdown_tx.subscribe()));
        let subscription = self.spawn_state_subscription();

        tracing::info!("Dispatch loop started");

        loop {
            let Some(intent) = intents.recv().await else {
                tracing::info!("Intent channel closed");
                break;
            };
            if self.handle(intent).await == Flow::Quit {
                break;
            }
        }

        tracing::info!("Quitting - disconnecting first");
        if let Err(e) = self.disconnect().await {
            tracing::warn!("Disconnect on quit: {}", e);
        }

        self.shutdown();
        if let Err(e) = reconciler.await {
            tracing::warn!("Status reconciler task failed: {}", e);
        }
        subscription.abort();

        tracing::info!("Dispatch loop stopped");
    }

    /// Stop the reconciler and any running config watcher
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    fn begin(&self, action: Action) {
        if !self.state.begin_action(action.clone()) {
            tracing::debug!("Starting {} while another action is recorded as running", action);
        }
    }

    /// Forward state changes the sink cares about
    fn spawn_state_subscription(&self) -> JoinHandle<()> {
        let mut rx = self.state.subscribe();
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            tracing::debug!("State subscription started");

            loop {
                match rx.recv().await {
                    Ok(StateChange::ActionFinished {
                        action,
                        error: Some(error),
                    }) => {
                        sink.notify(&format!("Failed to {}: {}", action, error));
                    }
                    Ok(StateChange::ActiveProfileChanged { profile }) => {
                        sink.set_active_profile(profile.as_deref());
                    }
                    Ok(StateChange::ConfigurationReloaded { profiles }) => {
                        tracing::info!("Configuration now has {} server(s)", profiles);
                    }
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("State subscription lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            tracing::debug!("State subscription stopped");
        })
    }
}
