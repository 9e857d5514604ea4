//! Shared fakes for the integration tests
//!
//! [`FakeHost`] simulates the process table, the socket table and the SOCKS
//! proxy setting in memory, so the supervisor and the probe can be driven end
//! to end without touching the machine.

#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use socksvpn::config::ConfigStore;
use socksvpn::models::{ServerProfile, Timings};
use socksvpn::services::{
    EditorLauncher, Host, HostError, ProcessInfo, Signal, SocketListener,
};
use socksvpn::ui::PresentationSink;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Every side-effecting call made against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Launch { program: String, args: Vec<String> },
    Signal { pid: u32, signal: Signal },
    EnableProxy { interface: String, host: String, port: u16 },
    DisableProxy { interface: String },
}

#[derive(Debug, Clone)]
struct FakeListener {
    owner: u32,
    port: u16,
    listener: SocketListener,
}

/// In-memory OS with just enough behaviour for autossh
#[derive(Default)]
pub struct FakeHost {
    processes: Mutex<Vec<ProcessInfo>>,
    listeners: Mutex<Vec<FakeListener>>,
    calls: Mutex<Vec<HostCall>>,
    proxy: Mutex<Option<(String, u16)>>,
    next_pid: AtomicU32,

    /// Launch fails with a non-zero exit status
    pub fail_launch: AtomicBool,
    /// Enabling the proxy fails
    pub fail_proxy_enable: AtomicBool,
    /// Disabling the proxy fails
    pub fail_proxy_disable: AtomicBool,
    /// Supervisor processes ignore SIGTERM
    pub ignore_term: AtomicBool,
    /// Supervisor processes ignore every signal
    pub unkillable: AtomicBool,
    /// `processes()` sleeps this long before answering
    process_delay: Mutex<Duration>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    fn allocate_pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Add an unrelated process to the table
    pub fn add_process(&self, command: &str) -> u32 {
        let pid = self.allocate_pid();
        self.processes.lock().unwrap().push(ProcessInfo {
            pid,
            command: command.to_string(),
        });
        pid
    }

    /// Add a listener owned by some other program
    pub fn add_listener(&self, port: u16, command: &str) -> u32 {
        let pid = self.add_process(command);
        self.listeners.lock().unwrap().push(FakeListener {
            owner: pid,
            port,
            listener: SocketListener {
                command: command.to_string(),
                pid,
            },
        });
        pid
    }

    pub fn set_process_delay(&self, delay: Duration) {
        *self.process_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Current SOCKS proxy target, `None` when disabled
    pub fn proxy(&self) -> Option<(String, u16)> {
        self.proxy.lock().unwrap().clone()
    }

    /// Running processes whose executable is `name`
    pub fn running(&self, name: &str) -> Vec<ProcessInfo> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name() == name)
            .cloned()
            .collect()
    }

    fn remove_process(&self, pid: u32) -> bool {
        let mut processes = self.processes.lock().unwrap();
        let before = processes.len();
        processes.retain(|p| p.pid != pid);
        let removed = processes.len() != before;
        drop(processes);

        if removed {
            self.listeners.lock().unwrap().retain(|l| l.owner != pid);
        }
        removed
    }
}

fn forward_port(args: &[String]) -> Option<u16> {
    let position = args.iter().position(|a| a == "-D")?;
    let bind = args.get(position + 1)?;
    bind.rsplit(':').next()?.parse().ok()
}

#[async_trait]
impl Host for FakeHost {
    async fn processes(&self) -> Result<Vec<ProcessInfo>, HostError> {
        let delay = *self.process_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.processes.lock().unwrap().clone())
    }

    async fn tcp_listeners(&self, port: u16) -> Result<Vec<SocketListener>, HostError> {
        Ok(self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.port == port)
            .map(|l| l.listener.clone())
            .collect())
    }

    async fn launch(&self, program: &Utf8Path, args: &[String]) -> Result<(), HostError> {
        self.record(HostCall::Launch {
            program: program.to_string(),
            args: args.to_vec(),
        });

        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(HostError::Failed {
                command: program.to_string(),
                code: Some(1),
                stderr: "ssh: Could not resolve hostname".to_string(),
            });
        }

        let pid = self.allocate_pid();
        self.processes.lock().unwrap().push(ProcessInfo {
            pid,
            command: format!("{} {}", program, args.join(" ")),
        });
        if let Some(port) = forward_port(args) {
            // autossh's ssh child owns the SOCKS socket
            self.listeners.lock().unwrap().push(FakeListener {
                owner: pid,
                port,
                listener: SocketListener {
                    command: "ssh".to_string(),
                    pid: pid + 10_000,
                },
            });
        }
        Ok(())
    }

    async fn signal(&self, pid: u32, signal: Signal) -> Result<(), HostError> {
        self.record(HostCall::Signal { pid, signal });

        let ignored = self.unkillable.load(Ordering::SeqCst)
            || (signal == Signal::Terminate && self.ignore_term.load(Ordering::SeqCst));
        if ignored {
            return Ok(());
        }

        if self.remove_process(pid) {
            Ok(())
        } else {
            Err(HostError::Failed {
                command: format!("kill -s {} {}", signal, pid),
                code: Some(1),
                stderr: "No such process".to_string(),
            })
        }
    }

    async fn enable_socks_proxy(
        &self,
        interface: &str,
        host: &str,
        port: u16,
    ) -> Result<(), HostError> {
        self.record(HostCall::EnableProxy {
            interface: interface.to_string(),
            host: host.to_string(),
            port,
        });
        if self.fail_proxy_enable.load(Ordering::SeqCst) {
            return Err(HostError::Failed {
                command: "networksetup -setsocksfirewallproxy".to_string(),
                code: Some(4),
                stderr: format!("{} is not a recognized network service.", interface),
            });
        }
        *self.proxy.lock().unwrap() = Some((host.to_string(), port));
        Ok(())
    }

    async fn disable_socks_proxy(&self, interface: &str) -> Result<(), HostError> {
        self.record(HostCall::DisableProxy {
            interface: interface.to_string(),
        });
        if self.fail_proxy_disable.load(Ordering::SeqCst) {
            return Err(HostError::Failed {
                command: "networksetup -setsocksfirewallproxystate".to_string(),
                code: Some(4),
                stderr: format!("{} is not a recognized network service.", interface),
            });
        }
        *self.proxy.lock().unwrap() = None;
        Ok(())
    }
}

/// Sink that records everything it is told
#[derive(Default)]
pub struct RecordingSink {
    pub connected: Mutex<Vec<bool>>,
    pub profiles: Mutex<Vec<Vec<String>>>,
    pub active: Mutex<Vec<Option<String>>>,
    pub notices: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn last_connected(&self) -> Option<bool> {
        self.connected.lock().unwrap().last().copied()
    }

    pub fn last_profiles(&self) -> Option<Vec<String>> {
        self.profiles.lock().unwrap().last().cloned()
    }

    pub fn last_active(&self) -> Option<Option<String>> {
        self.active.lock().unwrap().last().cloned()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn set_connected(&self, connected: bool) {
        self.connected.lock().unwrap().push(connected);
    }

    fn set_profiles(&self, profiles: &[ServerProfile]) {
        self.profiles
            .lock()
            .unwrap()
            .push(profiles.iter().map(|p| p.name.clone()).collect());
    }

    fn set_active_profile(&self, profile: Option<&str>) {
        self.active
            .lock()
            .unwrap()
            .push(profile.map(str::to_string));
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Editor that records what it was asked to open
#[derive(Default)]
pub struct RecordingEditor {
    pub opened: Mutex<Vec<Utf8PathBuf>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl EditorLauncher for RecordingEditor {
    async fn open(&self, path: &Utf8Path) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("no editor available");
        }
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Timings shrunk to milliseconds
pub fn fast_timings() -> Timings {
    Timings {
        reconcile_interval: Duration::from_millis(20),
        settle_interval: Duration::from_millis(5),
        settle_attempts: 5,
        kill_grace: Duration::ZERO,
        query_timeout: Duration::from_secs(1),
        watch_interval: Duration::from_millis(20),
        watch_limit: Duration::from_secs(3),
    }
}

pub const OFFICE_CONFIG: &str = r#"{
    "autossh_path": "/opt/homebrew/bin/autossh",
    "local_port": 1234,
    "interface": "Wi-Fi",
    "server_options": {},
    "commands": [
        {"name": "office", "description": "Office", "server": "office.example.com"},
        {"name": "home", "description": "Home lab", "server": "home.example.net"}
    ]
}"#;

/// Temporary directory holding `.vpn.json` with the given contents
pub fn store_with(contents: &str) -> (TempDir, ConfigStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().join(".vpn.json")).unwrap();
    std::fs::write(&path, contents).unwrap();
    (temp_dir, ConfigStore::new(path))
}

/// Temporary directory where `.vpn.json` does not exist yet
pub fn empty_store() -> (TempDir, ConfigStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().join(".vpn.json")).unwrap();
    (temp_dir, ConfigStore::new(path))
}
