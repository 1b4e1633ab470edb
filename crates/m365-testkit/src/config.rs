//! Harness configuration and bridge credentials.
//!
//! Settings that describe *how* to run the harness (launcher command, port
//! guard, scenario knobs) live in an optional TOML file. Credentials that
//! describe *who* the bridge authenticates as come from the environment,
//! after the file named by `TEST_ENV_FILE` (default `.env`) has been loaded.
//!
//! # Resolution
//!
//! 1. `M365_HARNESS_CONFIG` environment variable, if set
//! 2. `m365-harness.toml` in the current directory, if present
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! [launcher]
//! command = "uv"
//! args = ["run", "microsoft-mcp"]
//!
//! [port_guard]
//! port = 8000
//! attempts = 3
//! interval_ms = 1000
//!
//! [scenario]
//! mail_to = "me@example.com"
//! ```

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::PortGuardConfig;

/// File name looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "m365-harness.toml";
/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "M365_HARNESS_CONFIG";
/// Environment variable naming the dotenv file to load.
pub const ENV_FILE_ENV: &str = "TEST_ENV_FILE";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const CLIENT_ID_ENV: &str = "MICROSOFT_MCP_CLIENT_ID";
pub const TENANT_ID_ENV: &str = "MICROSOFT_MCP_TENANT_ID";
pub const DEFAULT_TENANT_ID: &str = "common";

/// Errors that can occur while loading the harness configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error when reading a config file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error when a config file is malformed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub launcher: LauncherConfig,
    pub port_guard: PortGuardConfig,
    pub scenario: ScenarioConfig,
}

/// Command line that starts the bridge process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment passed to the bridge on top of the credentials.
    pub env: BTreeMap<String, String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command: "uv".to_string(),
            args: vec!["run".to_string(), "microsoft-mcp".to_string()],
            env: BTreeMap::new(),
        }
    }
}

/// Knobs of the end-to-end smoke scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Recipient of the test email. Falls back to the first account.
    pub mail_to: Option<String>,
    pub read_count: u32,
    pub event_days_ahead: i64,
    pub event_duration_minutes: i64,
    pub calendar_days: u32,
    /// Drive folder the test file is uploaded into.
    pub upload_dir: String,
    pub search_query: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            mail_to: None,
            read_count: 5,
            event_days_ahead: 7,
            event_duration_minutes: 60,
            calendar_days: 14,
            upload_dir: "/".to_string(),
            search_query: "test".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Loads the configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the configuration: explicit path, then
    /// `M365_HARNESS_CONFIG`, then `./m365-harness.toml`, then defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file was found but could not be loaded.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, |key| std::env::var_os(key))
    }

    /// Like [`Self::resolve`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file was found but could not be loaded.
    pub fn resolve_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<OsString>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = lookup(CONFIG_PATH_ENV) {
            return Self::load(Path::new(&path));
        }
        let local = Path::new(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::load(local);
        }
        debug!("no harness config file found, using defaults");
        Ok(Self::default())
    }
}

/// Loads the dotenv file named by `TEST_ENV_FILE` (default `.env`).
///
/// Variables already present in the environment win. Returns the path that
/// was loaded, or `None` if there was nothing to load.
pub fn load_env_file() -> Option<PathBuf> {
    load_env_file_with(|key| std::env::var_os(key))
}

/// Like [`load_env_file`], reading `TEST_ENV_FILE` through `lookup`.
pub fn load_env_file_with(lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let path = env_file_path(lookup);
    match dotenvy::from_path(&path) {
        Ok(()) => {
            info!(path = %path.display(), "loaded environment file");
            Some(path)
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "environment file not loaded");
            None
        }
    }
}

/// Path of the dotenv file: `TEST_ENV_FILE`, or `.env`.
pub fn env_file_path(lookup: impl Fn(&str) -> Option<OsString>) -> PathBuf {
    lookup(ENV_FILE_ENV).map_or_else(|| PathBuf::from(DEFAULT_ENV_FILE), PathBuf::from)
}

/// Credentials the bridge process needs to authenticate against Microsoft
/// 365.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCredentials {
    pub client_id: String,
    pub tenant_id: String,
}

impl BridgeCredentials {
    /// Reads credentials from the process environment.
    ///
    /// Returns `None` when `MICROSOFT_MCP_CLIENT_ID` is missing or blank, in
    /// which case live scenarios are skipped.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads credentials through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let client_id = lookup(CLIENT_ID_ENV).filter(|value| !value.trim().is_empty())?;
        let tenant_id = lookup(TENANT_ID_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TENANT_ID.to_string());
        Some(Self {
            client_id,
            tenant_id,
        })
    }

    /// Environment pairs handed to the bridge process.
    pub fn env_pairs(&self) -> [(&'static str, &str); 2] {
        [
            (CLIENT_ID_ENV, self.client_id.as_str()),
            (TENANT_ID_ENV, self.tenant_id.as_str()),
        ]
    }
}
