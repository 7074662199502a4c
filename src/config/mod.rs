//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calling::session::{CallPolicy, DEFAULT_END_CALL_DELAY, DEFAULT_TICK_INTERVAL};
use crate::calling::state::DEFAULT_MAX_RECONNECTION_ATTEMPTS;

/// Application configuration
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Call lifecycle tunables
    #[serde(default)]
    pub call: CallConfig,
}

/// `[call]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Failed reconnections tolerated before the call is marked failed
    pub max_reconnection_attempts: u32,
    /// Grace period between hang-up and the ended state
    pub end_call_delay_ms: u64,
    /// How often the call duration is refreshed while connected
    pub duration_tick_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_reconnection_attempts: DEFAULT_MAX_RECONNECTION_ATTEMPTS,
            end_call_delay_ms: DEFAULT_END_CALL_DELAY.as_millis() as u64,
            duration_tick_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "cryb", "cryb-calls")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Resolve an explicit path or fall back to the default location
    pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(p.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load configuration from disk. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.call.duration_tick_ms == 0 {
            anyhow::bail!("call.duration_tick_ms must be greater than 0");
        }
        Ok(())
    }

    /// Controller policy built from the `[call]` section
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            max_reconnection_attempts: self.call.max_reconnection_attempts,
            end_call_delay: Duration::from_millis(self.call.end_call_delay_ms),
            tick_interval: Duration::from_millis(self.call.duration_tick_ms),
        }
    }
}
