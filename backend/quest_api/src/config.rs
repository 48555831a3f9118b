//! Application configuration loaded from environment variables.

use quest_engine::events::DEFAULT_EVENT_BUFFER;
use quest_engine::repository::DEFAULT_QUOTA_BYTES;
use quest_engine::CompletionPolicy;

use crate::errors::{Result, ServiceError};

/// Where quest records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the REST API server
    pub api_port: u16,
    /// Path to the SQLite event log
    pub database_url: String,
    pub storage_backend: StorageBackend,
    /// File backing the local cache; in-memory only when unset
    pub local_cache_path: Option<String>,
    pub local_cache_quota_bytes: usize,
    /// Base URL of the remote record store (required for `remote`)
    pub remote_store_url: Option<String>,
    pub remote_max_record_bytes: Option<usize>,
    pub completion_policy: CompletionPolicy,
    /// Capacity of the engine's event channel
    pub event_buffer: usize,
    /// JSON array of quests registered at startup
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_var = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ServiceError::Config(format!("Missing env var: {key}")))
        };

        let storage_backend = match env_var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "local" => StorageBackend::Local,
            "remote" => StorageBackend::Remote,
            other => {
                return Err(ServiceError::Config(format!(
                    "Invalid STORAGE_BACKEND: {other}"
                )))
            }
        };

        let remote_store_url = env_var("REMOTE_STORE_URL").ok();
        if storage_backend == StorageBackend::Remote && remote_store_url.is_none() {
            return Err(ServiceError::Config(
                "REMOTE_STORE_URL is required when STORAGE_BACKEND=remote".to_string(),
            ));
        }

        Ok(Config {
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./quest_events.db".to_string()),
            storage_backend,
            local_cache_path: env_var("LOCAL_CACHE_PATH").ok(),
            local_cache_quota_bytes: env_var("LOCAL_CACHE_QUOTA_BYTES")
                .unwrap_or_else(|_| DEFAULT_QUOTA_BYTES.to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid LOCAL_CACHE_QUOTA_BYTES".to_string()))?,
            remote_store_url,
            remote_max_record_bytes: env_var("REMOTE_MAX_RECORD_BYTES")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| ServiceError::Config("Invalid REMOTE_MAX_RECORD_BYTES".to_string()))?,
            completion_policy: env_var("COMPLETION_POLICY")
                .unwrap_or_else(|_| "automatic".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid COMPLETION_POLICY".to_string()))?,
            event_buffer: env_var("EVENT_BUFFER")
                .unwrap_or_else(|_| DEFAULT_EVENT_BUFFER.to_string())
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ServiceError::Config("Invalid EVENT_BUFFER".to_string()))?,
            seed_file: env_var("SEED_FILE").ok(),
        })
    }
}
