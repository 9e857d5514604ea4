use crate::metrics::Metrics;
use crate::models::{Configuration, ServerProfile};
use crate::services::host::{Host, HostError, ProcessInfo, Signal};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Address the SOCKS proxy setting points at
pub const PROXY_HOST: &str = "127.0.0.1";

/// Errors from connect and disconnect transitions
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Server '{0}' not found in configuration")]
    UnknownProfile(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to {action} SOCKS proxy on '{interface}': {source}")]
    ProxyConfig {
        action: ProxyAction,
        interface: String,
        #[source]
        source: HostError,
    },
}

impl TunnelError {
    /// `true` for errors caused by the configuration rather than the OS
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, TunnelError::UnknownProfile(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAction {
    Enable,
    Disable,
}

impl std::fmt::Display for ProxyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyAction::Enable => write!(f, "enable"),
            ProxyAction::Disable => write!(f, "disable"),
        }
    }
}

/// Owns the connect/disconnect transitions of the `autossh` tunnel.
///
/// The supervisor never caches whether a tunnel is up; it acts on the
/// process table each time and leaves verification to
/// [`ConnectionProbe`](crate::services::ConnectionProbe).
///
/// Transitions hold an internal lock, so a connect and a disconnect can
/// never interleave their OS side effects.
pub struct TunnelSupervisor {
    host: Arc<dyn Host>,
    metrics: Arc<Metrics>,
    kill_grace: Duration,
    transition: Mutex<()>,
}

impl TunnelSupervisor {
    pub fn new(host: Arc<dyn Host>, kill_grace: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            host,
            metrics,
            kill_grace,
            transition: Mutex::new(()),
        }
    }

    /// Build the `autossh` argument list for a profile.
    ///
    /// `-f` backgrounds autossh, `-M 0` disables its monitor port, `-N` runs
    /// no remote command and `-D` opens the SOCKS forward on loopback.
    pub fn build_tunnel_args(config: &Configuration, profile: &ServerProfile) -> Vec<String> {
        vec![
            "-f".to_string(),
            "-M".to_string(),
            "0".to_string(),
            "-o".to_string(),
            format!("ServerAliveInterval {}", config.options.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax {}", config.options.server_alive_count_max),
            "-D".to_string(),
            format!("localhost:{}", config.local_port),
            "-N".to_string(),
            profile.server.clone(),
        ]
    }

    /// Connect to the named server.
    ///
    /// Any existing tunnel is torn down first. On success the tunnel has
    /// been launched and the SOCKS proxy points at it; readiness is left to
    /// the probe.
    ///
    /// # Errors
    /// - [`TunnelError::UnknownProfile`] with no side effects at all
    /// - [`TunnelError::Spawn`] if autossh fails to start (proxy untouched)
    /// - [`TunnelError::ProxyConfig`] if the proxy could not be enabled; the
    ///   tunnel is left running
    pub async fn connect(
        &self,
        config: &Configuration,
        profile_name: &str,
    ) -> Result<(), TunnelError> {
        let profile = config.profile(profile_name).ok_or_else(|| {
            self.metrics.record_connect_failed();
            TunnelError::UnknownProfile(profile_name.to_string())
        })?;

        let _guard = self.transition.lock().await;
        tracing::info!("Connecting to {} ({})", profile.name, profile.server);

        if let Err(e) = self.disconnect_locked(config).await {
            tracing::warn!("Continuing connect after disconnect error: {}", e);
        }

        self.metrics.record_connect_started();
        let args = Self::build_tunnel_args(config, profile);
        if let Err(source) = self.host.launch(&config.autossh_path, &args).await {
            self.metrics.record_connect_failed();
            return Err(TunnelError::Spawn {
                program: config.autossh_path.to_string(),
                source,
            });
        }

        if let Err(source) = self
            .host
            .enable_socks_proxy(&config.interface, PROXY_HOST, config.local_port)
            .await
        {
            self.metrics.record_connect_failed();
            tracing::error!(
                "Tunnel to {} started but SOCKS proxy could not be enabled: {}",
                profile.name,
                source
            );
            return Err(TunnelError::ProxyConfig {
                action: ProxyAction::Enable,
                interface: config.interface.clone(),
                source,
            });
        }

        tracing::info!(
            "Connected to {}: SOCKS proxy on {} set to {}:{}",
            profile.name,
            config.interface,
            PROXY_HOST,
            config.local_port
        );
        Ok(())
    }

    /// Disable the proxy and stop every supervisor process.
    ///
    /// Idempotent: with nothing running this returns `Ok(())`. Only a proxy
    /// failure is returned; kill failures are logged because the next probe
    /// is the authority on what is still running.
    pub async fn disconnect(&self, config: &Configuration) -> Result<(), TunnelError> {
        let _guard = self.transition.lock().await;
        self.disconnect_locked(config).await
    }

    async fn disconnect_locked(&self, config: &Configuration) -> Result<(), TunnelError> {
        let proxy_result = self.host.disable_socks_proxy(&config.interface).await;
        if let Err(ref e) = proxy_result {
            tracing::warn!("Warning: failed to disable SOCKS proxy: {}", e);
        }

        self.terminate_supervisors(config.supervisor_name()).await;
        self.metrics.record_disconnect();

        proxy_result.map_err(|source| TunnelError::ProxyConfig {
            action: ProxyAction::Disable,
            interface: config.interface.clone(),
            source,
        })
    }

    /// SIGTERM every matching process, then SIGKILL whatever survives
    async fn terminate_supervisors(&self, supervisor: &str) {
        let targets = match self.find_supervisors(supervisor).await {
            Some(targets) if !targets.is_empty() => targets,
            Some(_) => {
                tracing::debug!("No {} processes running", supervisor);
                return;
            }
            None => return,
        };

        for process in &targets {
            tracing::info!("Stopping {} (pid {})", supervisor, process.pid);
            if let Err(e) = self.host.signal(process.pid, Signal::Terminate).await {
                // Usually the process exited between listing and signalling
                tracing::debug!("SIGTERM to pid {} failed: {}", process.pid, e);
            }
        }

        if !self.kill_grace.is_zero() {
            tokio::time::sleep(self.kill_grace).await;
        }

        let survivors = match self.find_supervisors(supervisor).await {
            Some(survivors) if !survivors.is_empty() => survivors,
            _ => return,
        };

        tracing::warn!(
            "{} {} process(es) still present after SIGTERM, issuing SIGKILL",
            survivors.len(),
            supervisor
        );
        for process in &survivors {
            self.metrics.record_kill_escalation();
            if let Err(e) = self.host.signal(process.pid, Signal::Kill).await {
                tracing::warn!("SIGKILL attempt for pid {} failed: {}", process.pid, e);
            }
        }
    }

    async fn find_supervisors(&self, supervisor: &str) -> Option<Vec<ProcessInfo>> {
        match self.host.processes().await {
            Ok(processes) => Some(
                processes
                    .into_iter()
                    .filter(|p| p.name() == supervisor)
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!("Could not list {} processes: {}", supervisor, e);
                None
            }
        }
    }
}
