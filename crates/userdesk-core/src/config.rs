//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, token conventions, timeouts, which credential backend to use,
//! and the last email used to log in.
//!
//! Configuration is stored at `~/.config/userdesk/config.json`. The base URL
//! and token placement can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::guard::{DEFAULT_REFRESH_PATH, DEFAULT_REFRESH_TIMEOUT_SECS};
use crate::auth::{GuardConfig, TokenFormat, TokenPlacement};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "userdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BASE_URL: &str = "http://localhost:1010";

/// Overrides `base_url`.
pub const ENV_API_URL: &str = "USERDESK_API_URL";

/// Overrides the placement mode (`header`, `query` or `both`).
pub const ENV_TOKEN_PLACEMENT: &str = "USERDESK_TOKEN_PLACEMENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub refresh_path: String,
    pub placement: TokenPlacement,
    pub token_format: TokenFormat,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            placement: TokenPlacement::default(),
            token_format: TokenFormat::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in practice).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(mode) = lookup(ENV_TOKEN_PLACEMENT) {
            let param = self.placement.query_param().unwrap_or("token").to_string();
            match TokenPlacement::from_mode(&mode, &param) {
                Some(placement) => self.placement = placement,
                None => warn!(mode = %mode, "Ignoring unknown token placement"),
            }
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            refresh_path: self.refresh_path.clone(),
            placement: self.placement.clone(),
            token_format: self.token_format.clone(),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backend() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:1010");
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.placement, TokenPlacement::Header);
        assert_eq!(config.token_format.access_token_field, "token");

        let guard = config.guard_config();
        assert_eq!(guard.refresh_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://users.example.com", "placement": {"mode": "both", "param": "token"}}"#,
        )
        .expect("write");

        let config = Config::load_from(&path).expect("loads");
        assert_eq!(config.base_url, "https://users.example.com");
        assert_eq!(
            config.placement,
            TokenPlacement::Both {
                param: "token".to_string()
            }
        );
        assert_eq!(config.refresh_timeout_secs, DEFAULT_REFRESH_TIMEOUT_SECS);
        assert_eq!(config.credential_backend, CredentialBackend::File);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            last_email: Some("ana@example.com".to_string()),
            credential_backend: CredentialBackend::Keyring,
            ..Config::default()
        };
        config.save_to(&path).expect("saves");
        assert_eq!(Config::load_from(&path).expect("loads"), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::load_from(&dir.path().join("absent.json")).expect("loads");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_API_URL => Some(" http://api.internal:8080 ".to_string()),
            ENV_TOKEN_PLACEMENT => Some("query".to_string()),
            _ => None,
        });
        assert_eq!(config.base_url, "http://api.internal:8080");
        assert_eq!(
            config.placement,
            TokenPlacement::Query {
                param: "token".to_string()
            }
        );

        // Unknown modes leave the placement alone
        config.apply_env(|key| (key == ENV_TOKEN_PLACEMENT).then(|| "cookie".to_string()));
        assert!(matches!(config.placement, TokenPlacement::Query { .. }));
    }
}
