// Console presentation sink
//
// Renders the tray's status glyph and tooltip as text lines. Reconciliation
// calls set_connected every few seconds; only changes are printed.

use crate::models::ServerProfile;
use crate::ui::PresentationSink;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

pub const CONNECTED_GLYPH: &str = "🌎";
pub const DISCONNECTED_GLYPH: &str = "🌐";

pub fn status_glyph(connected: bool) -> &'static str {
    if connected {
        CONNECTED_GLYPH
    } else {
        DISCONNECTED_GLYPH
    }
}

pub fn status_tooltip(connected: bool) -> &'static str {
    if connected {
        "SOCKS VPN Menu - Connected"
    } else {
        "SOCKS VPN Menu - Disconnected"
    }
}

/// Menu line for a profile: `description (server)`
pub fn profile_line(profile: &ServerProfile) -> String {
    format!("{} ({})", profile.label(), profile.server)
}

struct ConsoleInner {
    out: Box<dyn Write + Send>,
    last_connected: Option<bool>,
    active_profile: Option<String>,
}

/// [`PresentationSink`] that writes to stdout or any other writer
pub struct ConsoleSink {
    inner: Mutex<ConsoleInner>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(ConsoleInner {
                out,
                last_connected: None,
                active_profile: None,
            }),
        }
    }

    fn write_lines(inner: &mut ConsoleInner, lines: &[String]) {
        for line in lines {
            if let Err(e) = writeln!(inner.out, "{}", line) {
                tracing::warn!("Failed to write to console: {}", e);
                return;
            }
        }
        let _ = inner.out.flush();
    }
}

impl PresentationSink for ConsoleSink {
    fn set_connected(&self, connected: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.last_connected == Some(connected) {
            return;
        }
        inner.last_connected = Some(connected);

        let line = format!("{} {}", status_glyph(connected), status_tooltip(connected));
        Self::write_lines(&mut inner, &[line]);
    }

    fn set_profiles(&self, profiles: &[ServerProfile]) {
        let mut lines = Vec::with_capacity(profiles.len() + 1);
        if profiles.is_empty() {
            lines.push("No servers configured - use 'edit' to add some".to_string());
        } else {
            lines.push("Servers:".to_string());
            lines.extend(
                profiles
                    .iter()
                    .map(|p| format!("  {:<16} {}", p.name, profile_line(p))),
            );
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write_lines(&mut inner, &lines);
    }

    fn set_active_profile(&self, profile: Option<&str>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.active_profile.as_deref() == profile {
            return;
        }
        inner.active_profile = profile.map(str::to_string);

        // Clearing is already visible through the disconnected status line
        if let Some(profile) = profile {
            Self::write_lines(&mut inner, &[format!("Active server: {}", profile)]);
        }
    }

    fn notify(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write_lines(&mut inner, &[format!("! {}", message)]);
    }
}
