// UI module - presentation contract and intent dispatch
//
// This module contains:
// - PresentationSink: where state is rendered (console, or a tray in future)
// - Intent: the only requests a presentation layer can make
// - IntentBridge: bounded queue from presentation threads into the runtime
// - AppController: the single dispatch loop that owns all transitions

pub mod bridge;
pub mod console;
pub mod controller;

pub use bridge::IntentBridge;
pub use console::ConsoleSink;
pub use controller::AppController;

use crate::models::ServerProfile;
use std::fmt;

/// Receives state from the controller. Implementations must not block.
pub trait PresentationSink: Send + Sync {
    /// Latest probe verdict; called on every reconciliation, changed or not
    fn set_connected(&self, connected: bool);

    /// Profiles of the active configuration, in file order
    fn set_profiles(&self, profiles: &[ServerProfile]);

    /// Profile of the running tunnel, `None` once it is gone
    fn set_active_profile(&self, profile: Option<&str>);

    /// One-line message for the user, typically a failed action
    fn notify(&self, message: &str);
}

/// A user request coming from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Connect { profile: String },
    Disconnect,
    Edit,
    Quit,
}

impl Intent {
    /// Parse one console command: `connect <name>`, `disconnect`, `edit` or
    /// `quit`. Returns `None` for anything else.
    ///
    /// Everything after `connect` is the profile name, so names containing
    /// spaces can be used as written in the configuration.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match (command.to_lowercase().as_str(), rest) {
            ("connect" | "c", "") => None,
            ("connect" | "c", profile) => Some(Intent::Connect {
                profile: profile.to_string(),
            }),
            ("disconnect" | "d", "") => Some(Intent::Disconnect),
            ("edit" | "e", "") => Some(Intent::Edit),
            ("quit" | "q" | "exit", "") => Some(Intent::Quit),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Connect { profile } => write!(f, "connect {}", profile),
            Intent::Disconnect => write!(f, "disconnect"),
            Intent::Edit => write!(f, "edit"),
            Intent::Quit => write!(f, "quit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intents() {
        assert_eq!(
            Intent::parse("connect office"),
            Some(Intent::Connect {
                profile: "office".to_string()
            })
        );
        assert_eq!(Intent::parse("  D "), Some(Intent::Disconnect));
        assert_eq!(Intent::parse("edit"), Some(Intent::Edit));
        assert_eq!(Intent::parse("exit"), Some(Intent::Quit));
    }

    #[test]
    fn test_parse_rejects_malformed_commands() {
        assert_eq!(Intent::parse(""), None);
        assert_eq!(Intent::parse("connect"), None);
        assert_eq!(Intent::parse("disconnect now"), None);
        assert_eq!(Intent::parse("c   "), None);
        assert_eq!(Intent::parse("reboot"), None);
    }

    #[test]
    fn test_parse_profile_name_with_spaces() {
        assert_eq!(
            Intent::parse("connect home lab"),
            Some(Intent::Connect {
                profile: "home lab".to_string()
            })
        );
        assert_eq!(
            Intent::parse("  C  office  annex \n"),
            Some(Intent::Connect {
                profile: "office  annex".to_string()
            })
        );
    }
}
