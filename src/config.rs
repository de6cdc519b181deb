use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

fn default_workers() -> usize {
    4
}

/// client configuration stored in a TOML file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// root of the live asset tree being kept up to date
    pub live_dir: PathBuf,

    /// staging area for downloads, patch output and session state
    pub temp_dir: PathBuf,

    /// remote depot location the transport fetches from
    pub remote: String,

    /// move replaced or deleted files here instead of discarding them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// bound on concurrently processed files
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Config {
    /// create a config with the default worker bound and no backups
    pub fn new(
        live_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            live_dir: live_dir.into(),
            temp_dir: temp_dir.into(),
            remote: remote.into(),
            backup_dir: None,
            workers: default_workers(),
        }
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}
