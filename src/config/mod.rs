use crate::models::{ConfigFile, Configuration};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

pub mod watcher;

pub use watcher::ConfigWatcher;

/// File name of the configuration inside the user's home directory
pub const CONFIG_FILE_NAME: &str = ".vpn.json";

/// Errors raised while reading, validating or writing the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Server name '{0}' appears more than once in commands")]
    DuplicateProfile(String),

    #[error("Could not determine the home directory")]
    NoHomeDirectory,
}

/// Configuration store for `~/.vpn.json`.
///
/// Stateless apart from the path: [`load`](Self::load) and
/// [`reload`](Self::reload) always read the file again, and the caller owns
/// the resulting snapshot.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Utf8PathBuf,
}

impl ConfigStore {
    /// Create a store for an explicit file path
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store for `~/.vpn.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        let home = Utf8PathBuf::from_path_buf(home).map_err(|_| ConfigError::NoHomeDirectory)?;
        Ok(Self::new(home.join(CONFIG_FILE_NAME)))
    }

    /// Path of the configuration file
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read, parse and validate the configuration file.
    ///
    /// Missing or zero fields get their defaults; duplicate server names are
    /// rejected.
    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let config = Self::parse(&self.path, &contents)?;

        tracing::info!(
            "Loaded config from {} with {} server(s)",
            self.path,
            config.profile_count()
        );
        Ok(config)
    }

    /// Load the file again, typically after an edit
    pub fn reload(&self) -> Result<Configuration, ConfigError> {
        tracing::info!("Reloading configuration from {}", self.path);
        self.load()
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(origin: &Utf8Path, contents: &str) -> Result<Configuration, ConfigError> {
        let file: ConfigFile =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        Configuration::from_file(file)
    }

    /// Write a configuration in the on-disk JSON shape
    pub fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string_pretty(&config.to_file()).map_err(ConfigError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!("Saved config to {}", self.path);
        Ok(())
    }

    /// Write the first-run template with a single example server
    pub fn create_default(&self) -> Result<(), ConfigError> {
        self.save(&Configuration::template())?;
        tracing::info!("Created example configuration at {}", self.path);
        Ok(())
    }

    /// Create the template only if no configuration exists yet.
    ///
    /// # Returns
    /// `true` if a new file was written
    pub fn ensure_exists(&self) -> Result<bool, ConfigError> {
        if self.exists() {
            return Ok(false);
        }
        tracing::info!("Configuration file doesn't exist, creating example configuration");
        self.create_default()?;
        Ok(true)
    }
}
