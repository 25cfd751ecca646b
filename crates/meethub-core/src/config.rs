//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! URL, timeouts, cache TTLs, where the session is stored and the route
//! guard rules.
//!
//! Configuration is stored at `~/.config/meethub/config.json`. Missing files
//! yield the defaults; `MEETHUB_API_URL` and `MEETHUB_STORAGE` override the
//! file when set.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::auth::{FileStorage, KeyValueStorage, KeyringStorage, MemoryStorage};
use crate::guard::{RouteGuard, RouteRule};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "meethub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api/";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// GET responses are cached for 5 minutes.
const DEFAULT_RESPONSE_CACHE_TTL_SECS: u64 = 5 * 60;

/// The app config object changes rarely; cache it for an hour.
const DEFAULT_APP_CONFIG_TTL_SECS: u64 = 60 * 60;

pub const ENV_API_URL: &str = "MEETHUB_API_URL";
pub const ENV_STORAGE: &str = "MEETHUB_STORAGE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find {0} directory")]
    MissingDirectory(&'static str),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Where the session tokens are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_STORAGE,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub response_cache_ttl_secs: u64,
    pub app_config_ttl_secs: u64,
    pub storage: StorageBackend,
    /// Route guard rules; empty means the built-in defaults
    pub routes: Vec<RouteRule>,
    pub login_path: String,
    pub unauthorized_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            response_cache_ttl_secs: DEFAULT_RESPONSE_CACHE_TTL_SECS,
            app_config_ttl_secs: DEFAULT_APP_CONFIG_TTL_SECS,
            storage: StorageBackend::default(),
            routes: Vec::new(),
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            debug!(path = %path.display(), "Loaded client config");
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(storage) = std::env::var(ENV_STORAGE) {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::MissingDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session file when `storage` is `file`
    pub fn session_dir() -> Result<PathBuf, ConfigError> {
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::MissingDirectory("cache"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn response_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.response_cache_ttl_secs)
    }

    pub fn app_config_ttl(&self) -> Duration {
        Duration::from_secs(self.app_config_ttl_secs)
    }

    /// Open the configured session storage backend
    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStorage>, ConfigError> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStorage::in_dir(Self::session_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStorage::new()),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        })
    }

    pub fn route_guard(&self) -> RouteGuard {
        let rules = if self.routes.is_empty() {
            RouteGuard::default_rules()
        } else {
            self.routes.clone()
        };
        RouteGuard::new(rules)
            .with_login_path(self.login_path.clone())
            .with_unauthorized_path(self.unauthorized_path.clone())
    }
}
