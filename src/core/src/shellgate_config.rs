use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::SshSettings;
use crate::paths::shellgate_config_path;

/// Optional on-disk settings (`~/.shellgate/config.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShellgateConfig {
    pub ssh: SshSettings,
}

impl ShellgateConfig {
    pub fn load() -> Result<Self, String> {
        let path = shellgate_config_path()?;
        Self::load_from_path(&path)
    }

    /// Missing file means defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        shellgate_config_path()
    }
}
