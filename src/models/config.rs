use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const DEFAULT_AUTOSSH_PATH: &str = "/opt/homebrew/bin/autossh";
pub const DEFAULT_LOCAL_PORT: u16 = 1234;
pub const DEFAULT_INTERFACE: &str = "Wi-Fi";
pub const DEFAULT_SERVER_ALIVE_INTERVAL: u32 = 10;
pub const DEFAULT_SERVER_ALIVE_COUNT_MAX: u32 = 3;

/// On-disk shape of `~/.vpn.json`.
///
/// Every field is optional; zero and empty values mean "use the default".
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub autossh_path: String,

    #[serde(default)]
    pub local_port: u32,

    #[serde(default)]
    pub interface: String,

    #[serde(default)]
    pub server_options: ServerOptionsFile,

    #[serde(default)]
    pub commands: Vec<CommandEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerOptionsFile {
    #[serde(default)]
    pub server_alive_interval: u32,

    #[serde(default)]
    pub server_alive_count_max: u32,
}

/// A named server entry as written in the `commands` array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub server: String,
}

/// SSH keepalive options passed to every tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelOptions {
    pub server_alive_interval: u32,
    pub server_alive_count_max: u32,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            server_alive_interval: DEFAULT_SERVER_ALIVE_INTERVAL,
            server_alive_count_max: DEFAULT_SERVER_ALIVE_COUNT_MAX,
        }
    }
}

/// A server the user can connect to, keyed by `name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: String,
    pub description: String,
    pub server: String,
}

impl ServerProfile {
    /// Text shown in menus: the description, or the name when none was given
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// Validated configuration with every default applied.
///
/// Treated as an immutable snapshot: reloads build a new value and swap the
/// `Arc` held by [`StateManager`](crate::state::StateManager).
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub autossh_path: Utf8PathBuf,
    pub local_port: u16,
    pub interface: String,
    pub options: TunnelOptions,
    profiles: IndexMap<String, ServerProfile>,
}

impl Default for Configuration {
    /// Used when no configuration could be loaded at startup
    fn default() -> Self {
        Self {
            autossh_path: Utf8PathBuf::from(DEFAULT_AUTOSSH_PATH),
            local_port: DEFAULT_LOCAL_PORT,
            interface: DEFAULT_INTERFACE.to_string(),
            options: TunnelOptions::default(),
            profiles: IndexMap::new(),
        }
    }
}

impl Configuration {
    /// Apply field-level defaults and validate a parsed file.
    ///
    /// Profile names must be unique; the first duplicate found is reported
    /// as [`ConfigError::DuplicateProfile`].
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let autossh_path = if file.autossh_path.trim().is_empty() {
            Utf8PathBuf::from(DEFAULT_AUTOSSH_PATH)
        } else {
            Utf8PathBuf::from(file.autossh_path.trim())
        };

        let local_port = match file.local_port {
            0 => DEFAULT_LOCAL_PORT,
            port => u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
                key: "local_port".to_string(),
                message: format!("{} is outside 1-65535", port),
            })?,
        };

        let interface = if file.interface.trim().is_empty() {
            DEFAULT_INTERFACE.to_string()
        } else {
            file.interface
        };

        let options = TunnelOptions {
            server_alive_interval: non_zero_or(
                file.server_options.server_alive_interval,
                DEFAULT_SERVER_ALIVE_INTERVAL,
            ),
            server_alive_count_max: non_zero_or(
                file.server_options.server_alive_count_max,
                DEFAULT_SERVER_ALIVE_COUNT_MAX,
            ),
        };

        let mut profiles = IndexMap::with_capacity(file.commands.len());
        for (index, entry) in file.commands.into_iter().enumerate() {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("commands[{}].name", index),
                    message: "must not be empty".to_string(),
                });
            }
            let server = entry.server.trim().to_string();
            if server.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("commands[{}].server", index),
                    message: "must not be empty".to_string(),
                });
            }
            if profiles.contains_key(&name) {
                return Err(ConfigError::DuplicateProfile(name));
            }
            profiles.insert(
                name.clone(),
                ServerProfile {
                    name,
                    description: entry.description,
                    server,
                },
            );
        }

        Ok(Self {
            autossh_path,
            local_port,
            interface,
            options,
            profiles,
        })
    }

    /// Convert back to the on-disk shape (all defaults written out explicitly)
    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            autossh_path: self.autossh_path.to_string(),
            local_port: u32::from(self.local_port),
            interface: self.interface.clone(),
            server_options: ServerOptionsFile {
                server_alive_interval: self.options.server_alive_interval,
                server_alive_count_max: self.options.server_alive_count_max,
            },
            commands: self
                .profiles
                .values()
                .map(|p| CommandEntry {
                    name: p.name.clone(),
                    description: p.description.clone(),
                    server: p.server.clone(),
                })
                .collect(),
        }
    }

    /// The first-run template: one example profile to edit
    pub fn template() -> Self {
        let mut config = Self::default();
        config.profiles.insert(
            "example".to_string(),
            ServerProfile {
                name: "example".to_string(),
                description: "Example VPN Server".to_string(),
                server: "your-server-name-or-ip".to_string(),
            },
        );
        config
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Option<&ServerProfile> {
        self.profiles.get(name)
    }

    /// Profiles in file order
    pub fn profiles(&self) -> impl Iterator<Item = &ServerProfile> {
        self.profiles.values()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Executable name of the supervisor (e.g. `autossh`), used to find its processes
    pub fn supervisor_name(&self) -> &str {
        self.autossh_path
            .file_name()
            .unwrap_or_else(|| self.autossh_path.as_str())
    }
}

fn non_zero_or(value: u32, default: u32) -> u32 {
    if value == 0 { default } else { value }
}
