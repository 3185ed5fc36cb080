//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sipsync_core::config::SyncSettings;
use sipsync_core::util::normalize_text_option;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sync: SyncSettings,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    Ok(dirs::config_dir()
        .ok_or(CliError::MissingPlatformDir("config"))?
        .join("sipsync")
        .join(CONFIG_FILE_NAME))
}

impl CliConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self {
                version: default_config_version(),
                ..Self::default()
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// File settings with `SIPSYNC_*` overrides applied, validated.
    pub fn effective_settings(&self) -> Result<SyncSettings, CliError> {
        let settings = self.sync.clone().with_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Explicit user first, then the configured one.
    pub fn resolve_user(&self, explicit: Option<String>) -> Result<String, CliError> {
        normalize_text_option(explicit)
            .or_else(|| normalize_text_option(self.user_id.clone()))
            .ok_or(CliError::MissingUser)
    }

    fn normalize(&mut self) {
        self.user_id = normalize_text_option(self.user_id.take());
        self.sync.remote_base_url = self.sync.remote_base_url();
        self.sync.auth_token = normalize_text_option(self.sync.auth_token.take());
    }
}
