//! Configuration loading and defaults for towel.
//!
//! Only presentation and plumbing live here. The work/rest schedule is fixed
//! (see [`crate::machine::Schedule`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for towel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// X display to connect to. If unset, uses `$DISPLAY`.
    pub display: Option<String>,

    /// Whether to show desktop notifications when a break starts and ends
    /// (default: true).
    pub notifications: bool,

    /// Vertical offset of the countdown's drop shadow in pixels (default: 6).
    pub shadow_offset: i16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: None,
            notifications: true,
            shadow_offset: 6,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        // Try default config path
        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("towel").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }
}
