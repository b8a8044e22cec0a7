//! Process-wide configuration.
//!
//! The global packages cache location depends on the environment, so it is
//! resolved once by [`Config::from_env`] and handed to every component that
//! needs it. Tests build a [`Config`] directly with a fake root.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable that relocates the global packages cache.
pub const GLOBAL_PACKAGES_ENV: &str = "NUGET_PACKAGES";

pub const DEFAULT_REGISTRY: &str = "https://api.nuget.org";

/// Upper bound for a downloaded artifact (256 MiB).
pub const DEFAULT_DOWNLOAD_LIMIT: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the home directory; set {GLOBAL_PACKAGES_ENV}")]
    NoHomeDirectory,

    #[error("Logging is already initialized: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the global packages cache (`~/.nuget/packages`).
    pub global_packages_dir: PathBuf,

    /// Current-generation toolchain executable.
    pub dotnet_executable: String,

    /// Legacy toolchain executable.
    pub nuget_executable: String,

    /// Registry server used for artifact downloads.
    pub registry_url: String,

    /// Maximum accepted artifact size in bytes.
    pub download_limit_bytes: u64,
}

impl Config {
    /// Creates a configuration with default executables and registry.
    pub fn new(global_packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_packages_dir: global_packages_dir.into(),
            dotnet_executable: "dotnet".to_string(),
            nuget_executable: "nuget".to_string(),
            registry_url: DEFAULT_REGISTRY.to_string(),
            download_limit_bytes: DEFAULT_DOWNLOAD_LIMIT,
        }
    }

    /// Resolves the global packages cache from the environment.
    ///
    /// `NUGET_PACKAGES` wins when set and non-empty, otherwise the cache is
    /// `<home>/.nuget/packages`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDirectory`] if neither is available.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(std::env::var(GLOBAL_PACKAGES_ENV).ok(), dirs::home_dir())
    }

    fn resolve(env_value: Option<String>, home: Option<PathBuf>) -> Result<Self, ConfigError> {
        let global_packages_dir = match env_value.filter(|value| !value.trim().is_empty()) {
            Some(value) => PathBuf::from(value),
            None => home
                .ok_or(ConfigError::NoHomeDirectory)?
                .join(".nuget")
                .join("packages"),
        };
        Ok(Self::new(global_packages_dir))
    }

    pub fn with_global_packages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_packages_dir = dir.into();
        self
    }

    pub fn with_dotnet(mut self, executable: impl Into<String>) -> Self {
        self.dotnet_executable = executable.into();
        self
    }

    pub fn with_nuget(mut self, executable: impl Into<String>) -> Self {
        self.nuget_executable = executable.into();
        self
    }

    pub fn with_registry(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    pub fn with_download_limit(mut self, bytes: u64) -> Self {
        self.download_limit_bytes = bytes;
        self
    }
}
