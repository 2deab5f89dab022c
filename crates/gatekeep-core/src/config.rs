//! Application configuration management.
//!
//! This module handles loading and saving the client configuration:
//! API location, deployment environment, credential storage backend,
//! and the last username used to sign in.
//!
//! Configuration is stored at `~/.config/gatekeep/config.json`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiClient, DEFAULT_API_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::{CredentialBackend, CredentialStore, FileBackend, KeyringBackend, MemoryBackend};

/// Application name used for config/data directory paths
const APP_NAME: &str = "gatekeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow::anyhow!("Unknown environment: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub environment: Environment,
    pub storage: StorageKind,
    pub request_timeout_secs: u64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            environment: Environment::default(),
            storage: StorageKind::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `GATEKEEP_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("GATEKEEP_API_URL") {
            self.api_url = url;
        }
        if let Some(env) = var("GATEKEEP_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(storage) = var("GATEKEEP_STORAGE") {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file credential backend
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Credentials require an encrypted transport outside development
    pub fn secure_credentials(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url, Duration::from_secs(self.request_timeout_secs))
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        let backend: Arc<dyn CredentialBackend> = match self.storage {
            StorageKind::File => Arc::new(FileBackend::new(&self.data_dir()?)),
            StorageKind::Keyring => Arc::new(KeyringBackend::default()),
            StorageKind::Memory => Arc::new(MemoryBackend::new()),
        };
        debug!(storage = ?self.storage, secure = self.secure_credentials(), "Credential store configured");
        Ok(CredentialStore::new(backend, self.secure_credentials()))
    }
}
