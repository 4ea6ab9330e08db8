use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dock_core::{ProvisioningSettings, SchedulerSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine endpoint; platform default when unset.
    pub docker_host: Option<String>,
    pub refresh_interval_secs: u64,
    pub pull_confirmation_ms: u64,
    pub log_tail: String,
    pub search_limit: usize,
    pub dark_mode: bool,
    pub templates_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: None,
            refresh_interval_secs: 5,
            pull_confirmation_ms: 1000,
            log_tail: "100".to_string(),
            search_limit: 25,
            dark_mode: false,
            templates_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).with_context(|| format!("Failed to read config {:?}", path))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir {:?}", parent))?;
        }
        let bytes = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
        }
    }

    pub fn provisioning_settings(&self) -> ProvisioningSettings {
        ProvisioningSettings {
            pull_confirmation: Duration::from_millis(self.pull_confirmation_ms),
        }
    }

    pub fn templates_path(&self) -> PathBuf {
        self.templates_path
            .clone()
            .unwrap_or_else(dock_core::store::default_templates_path)
    }
}

pub fn default_config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("dock");
    dir.push("config.json");
    dir
}
