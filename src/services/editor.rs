// Editor launching for the configuration file
//
// Opens ~/.vpn.json in the user's editor without waiting for it to close;
// the config watcher picks up the saved result.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use camino::Utf8Path;
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable naming an editor command to use instead of the
/// platform opener
pub const EDITOR_ENV: &str = "SOCKSVPN_EDITOR";

/// Opens a file for editing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EditorLauncher: Send + Sync {
    async fn open(&self, path: &Utf8Path) -> Result<()>;
}

/// Opens files with `$SOCKSVPN_EDITOR`, or `open -t` on macOS and
/// `xdg-open` elsewhere
#[derive(Debug, Clone, Default)]
pub struct SystemEditor {
    command: Option<String>,
}

impl SystemEditor {
    /// Read the editor override from the environment
    pub fn from_env() -> Self {
        Self {
            command: std::env::var(EDITOR_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
        }
    }

    /// Program and leading arguments used to open `path`
    pub fn invocation(&self, path: &Utf8Path) -> (String, Vec<String>) {
        if let Some(command) = &self.command {
            let mut parts = command.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                let mut args: Vec<String> = parts.collect();
                args.push(path.to_string());
                return (program, args);
            }
        }

        if cfg!(target_os = "macos") {
            ("open".to_string(), vec!["-t".to_string(), path.to_string()])
        } else {
            ("xdg-open".to_string(), vec![path.to_string()])
        }
    }
}

#[async_trait]
impl EditorLauncher for SystemEditor {
    async fn open(&self, path: &Utf8Path) -> Result<()> {
        let (program, args) = self.invocation(path);
        tracing::info!("Opening {} with {}", path, program);

        // Not awaited: the child is reaped in the background
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start editor '{}'", program))?;

        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                bail!("Editor '{}' exited with {}", program, status)
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Could not poll editor process: {}", e),
        }

        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                tracing::debug!("Editor process wait failed: {}", e);
            }
        });

        Ok(())
    }
}
