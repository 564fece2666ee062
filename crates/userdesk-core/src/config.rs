//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! API endpoint, where the session token is kept, the Authorization header
//! scheme, request timeout, and the last used username.
//!
//! Configuration is stored at `~/.config/userdesk/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ClientOptions, DEFAULT_API_ENDPOINT, REQUEST_TIMEOUT_SECS};
use crate::auth::{CredentialStore, FileStorage, KeyringStorage, TOKEN_KEY};

/// Application name used for config/data directory paths
const APP_NAME: &str = "userdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable naming the API endpoint
pub const ENDPOINT_ENV: &str = "USERDESK_API_ENDPOINT";

/// Endpoint variable read by the earlier mobile build's `.env` files
pub const LEGACY_ENDPOINT_ENV: &str = "VITE_API_ENDPOINT";

/// Where the session token is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_endpoint: Option<String>,
    pub storage: StorageKind,
    pub auth_scheme: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
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

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Token file used by the `file` storage backend
    pub fn token_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(TOKEN_KEY))
    }

    /// Endpoint from the environment, then the config file, then the built-in default
    pub fn api_endpoint(&self) -> String {
        Self::pick_endpoint(
            std::env::var(ENDPOINT_ENV).ok(),
            std::env::var(LEGACY_ENDPOINT_ENV).ok(),
            self.api_endpoint.clone(),
        )
    }

    fn pick_endpoint(env: Option<String>, legacy_env: Option<String>, configured: Option<String>) -> String {
        [env, legacy_env, configured]
            .into_iter()
            .flatten()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .find(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
    }

    /// Configured timeout; zero counts as unset
    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_endpoint(),
            timeout: self.request_timeout(),
            auth_scheme: self
                .auth_scheme
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        }
    }

    /// Open the credential store on the configured backend
    pub fn open_store(&self) -> Result<CredentialStore> {
        Ok(match self.storage {
            StorageKind::File => CredentialStore::new(FileStorage::new(Self::token_path()?)),
            StorageKind::Keyring => CredentialStore::new(KeyringStorage::new(APP_NAME)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pick_endpoint_order() {
        let env = Some("https://env.example/api".to_string());
        let legacy = Some("https://legacy.example/api".to_string());
        let configured = Some("https://config.example/api/".to_string());

        assert_eq!(
            Config::pick_endpoint(env, legacy.clone(), configured.clone()),
            "https://env.example/api"
        );
        assert_eq!(
            Config::pick_endpoint(None, legacy, configured.clone()),
            "https://legacy.example/api"
        );
        assert_eq!(
            Config::pick_endpoint(Some("  ".to_string()), None, configured),
            "https://config.example/api"
        );
        assert_eq!(Config::pick_endpoint(None, None, None), DEFAULT_API_ENDPOINT);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.storage, StorageKind::File);
        assert!(config.auth_scheme.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(APP_NAME).join(CONFIG_FILE);

        let config = Config {
            storage: StorageKind::Keyring,
            auth_scheme: Some("Bearer".to_string()),
            request_timeout_secs: Some(10),
            last_username: Some("alice".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.storage, StorageKind::Keyring);
        assert_eq!(loaded.last_username.as_deref(), Some("alice"));
        assert_eq!(loaded.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"storage": "keyring"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage, StorageKind::Keyring);
        assert!(config.api_endpoint.is_none());
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let config = Config {
            request_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(REQUEST_TIMEOUT_SECS));
        assert_eq!(config.client_options().timeout, Duration::from_secs(REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_client_options_blank_scheme_is_none() {
        let config = Config {
            auth_scheme: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(config.client_options().auth_scheme.is_none());
    }
}
