//! Process boundary: every OS command the controller runs goes through [`Host`].
//!
//! [`SystemHost`] shells out to the macOS/BSD tools (`ps`, `lsof`, `kill`,
//! `networksetup`). Only the semantics of each call matter to the rest of the
//! crate, so tests substitute a fake or a `MockHost`.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Errors from running an OS command
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {}: {stderr}", exit_description(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} did not finish within {after:?}")]
    Timeout {
        command: String,
        after: std::time::Duration,
    },
}

/// One entry of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Full command line, executable first
    pub command: String,
}

impl ProcessInfo {
    /// Executable name: the file name of the first command-line token
    pub fn name(&self) -> &str {
        let program = self.command.split_whitespace().next().unwrap_or("");
        Utf8Path::new(program).file_name().unwrap_or(program)
    }
}

/// A process holding a listening TCP socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketListener {
    /// Process name as reported by the socket table (may be truncated)
    pub command: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

impl Signal {
    fn as_kill_arg(self) -> &'static str {
        match self {
            Signal::Terminate => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.as_kill_arg())
    }
}

/// OS operations used by the probe and the supervisor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Host: Send + Sync {
    /// Snapshot of the process table
    async fn processes(&self) -> Result<Vec<ProcessInfo>, HostError>;

    /// Processes listening on TCP `port`; empty when nothing listens
    async fn tcp_listeners(&self, port: u16) -> Result<Vec<SocketListener>, HostError>;

    /// Run a program that daemonizes itself and wait for the launcher to exit
    async fn launch(&self, program: &Utf8Path, args: &[String]) -> Result<(), HostError>;

    /// Send a signal to one process
    async fn signal(&self, pid: u32, signal: Signal) -> Result<(), HostError>;

    /// Point the interface's SOCKS proxy at `host:port` and turn it on
    async fn enable_socks_proxy(
        &self,
        interface: &str,
        host: &str,
        port: u16,
    ) -> Result<(), HostError>;

    /// Turn the interface's SOCKS proxy off
    async fn disable_socks_proxy(&self, interface: &str) -> Result<(), HostError>;
}

/// [`Host`] backed by the system's command-line tools
#[derive(Debug, Clone)]
pub struct SystemHost {
    ps: Utf8PathBuf,
    lsof: Utf8PathBuf,
    networksetup: Utf8PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self {
            ps: Utf8PathBuf::from("ps"),
            lsof: Utf8PathBuf::from("lsof"),
            networksetup: Utf8PathBuf::from("/usr/sbin/networksetup"),
        }
    }
}

impl SystemHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a command to completion, returning stdout on a zero exit status
    async fn run(&self, program: &Utf8Path, args: &[&str]) -> Result<String, HostError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HostError::Io {
                command: describe(program, args),
                source,
            })?;

        if !output.status.success() {
            return Err(HostError::Failed {
                command: describe(program, args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn processes(&self) -> Result<Vec<ProcessInfo>, HostError> {
        let stdout = self.run(&self.ps, &["-axww", "-o", "pid=,args="]).await?;
        Ok(parse_ps_output(&stdout))
    }

    async fn tcp_listeners(&self, port: u16) -> Result<Vec<SocketListener>, HostError> {
        let port_arg = format!("-iTCP:{}", port);
        match self.run(&self.lsof, &["-nP", &port_arg, "-sTCP:LISTEN"]).await {
            Ok(stdout) => Ok(parse_lsof_output(&stdout)),
            // lsof exits 1 with no output when nothing matches
            Err(HostError::Failed {
                code: Some(1),
                ref stderr,
                ..
            }) if stderr.is_empty() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn launch(&self, program: &Utf8Path, args: &[String]) -> Result<(), HostError> {
        let command = describe(program, &args.iter().map(String::as_str).collect::<Vec<_>>());
        tracing::info!("Executing: {}", command);

        // The daemonized child inherits stdio; piping it would keep output()
        // waiting for the tunnel to exit.
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| HostError::Io {
                command: command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(HostError::Failed {
                command,
                code: status.code(),
                stderr: String::new(),
            });
        }
        Ok(())
    }

    async fn signal(&self, pid: u32, signal: Signal) -> Result<(), HostError> {
        let pid_arg = pid.to_string();
        self.run(
            Utf8Path::new("kill"),
            &["-s", signal.as_kill_arg(), &pid_arg],
        )
        .await
        .map(|_| ())
    }

    async fn enable_socks_proxy(
        &self,
        interface: &str,
        host: &str,
        port: u16,
    ) -> Result<(), HostError> {
        let port_arg = port.to_string();
        self.run(
            &self.networksetup,
            &["-setsocksfirewallproxy", interface, host, &port_arg],
        )
        .await?;
        self.run(
            &self.networksetup,
            &["-setsocksfirewallproxystate", interface, "on"],
        )
        .await
        .map(|_| ())
    }

    async fn disable_socks_proxy(&self, interface: &str) -> Result<(), HostError> {
        self.run(
            &self.networksetup,
            &["-setsocksfirewallproxystate", interface, "off"],
        )
        .await
        .map(|_| ())
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn describe(program: &Utf8Path, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Parse `ps -o pid=,args=` output: one `<pid> <command line>` per line
pub fn parse_ps_output(stdout: &str) -> Vec<ProcessInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, command) = line.split_once(char::is_whitespace)?;
            let pid = pid.parse().ok()?;
            let command = command.trim();
            if command.is_empty() {
                return None;
            }
            Some(ProcessInfo {
                pid,
                command: command.to_string(),
            })
        })
        .collect()
}

/// Parse `lsof -nP -iTCP:<port> -sTCP:LISTEN` output.
///
/// The first line is the column header; COMMAND and PID are the first two
/// columns of every following line.
pub fn parse_lsof_output(stdout: &str) -> Vec<SocketListener> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let command = columns.next()?;
            let pid = columns.next()?.parse().ok()?;
            Some(SocketListener {
                command: command.to_string(),
                pid,
            })
        })
        .collect()
}
