//! Application settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional JSON
//! file, then `IPW_`-prefixed environment variables. A broken settings file is
//! never fatal; the server falls back to defaults and says so in the log.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub web_host: String,
    pub web_port: u16,
    /// Server port used when a start request does not name one
    pub iperf_port: u16,
    pub default_target: String,
    pub default_iface: String,
    /// Explicit iperf3 binary; bundled and `PATH` lookups are skipped when set
    pub iperf_binary: Option<PathBuf>,
    /// Directory receiving one log file per run
    pub log_dir: PathBuf,
    /// How long a superseded iperf3 gets to exit before it is killed
    pub terminate_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            web_host: "0.0.0.0".to_string(),
            web_port: 5000,
            iperf_port: 5201,
            default_target: String::new(),
            default_iface: String::new(),
            iperf_binary: None,
            log_dir: PathBuf::from("logs"),
            terminate_grace_ms: 500,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Using default settings: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(false))
            .add_source(Environment::with_prefix("IPW").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read settings from {}", path.display()))?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

/// Where settings are read from, re-read on every start request
#[derive(Debug, Clone)]
pub struct SettingsSource {
    path: PathBuf,
}

impl SettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        Settings::load(&self.path)
    }
}

impl Default for SettingsSource {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_FILE)
    }
}
