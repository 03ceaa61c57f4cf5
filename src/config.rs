//! Configuration storage.
//!
//! A small TOML file under the platform config directory holds the auth
//! key and defaults; `VOXLATE_AUTH_KEY` and `VOXLATE_API_URL` override it
//! without touching disk.

use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_URL;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service auth key. Created by `voxlate config set-key`.
    #[serde(default)]
    pub auth_key: Option<String>,
    /// Override for the REST endpoint (self-hosted / regional deployments).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Default formality applied when a command does not pass one.
    #[serde(default)]
    pub formality: Option<String>,
}

impl Config {
    pub fn path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "Voxlate", "voxlate")
            .context("could not determine a config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Effective auth key: environment wins over the config file.
    pub fn auth_key(&self) -> anyhow::Result<String> {
        if let Ok(key) = std::env::var("VOXLATE_AUTH_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        match &self.auth_key {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => bail!(
                "no auth key configured; run `voxlate config set-key <KEY>` \
                 or set VOXLATE_AUTH_KEY"
            ),
        }
    }

    /// Effective API base URL.
    pub fn api_url(&self) -> String {
        if let Ok(url) = std::env::var("VOXLATE_API_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        self.api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            auth_key: Some("k-123".into()),
            api_url: Some("https://api.eu.voxlate.com/v1".into()),
            formality: Some("more".into()),
        };
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.auth_key.as_deref(), Some("k-123"));
        assert_eq!(parsed.formality.as_deref(), Some("more"));
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert!(parsed.auth_key.is_none());
        assert!(parsed.api_url.is_none());
    }
}
