use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::RetryPolicy;
use crate::pipeline::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

/// Application-level constants
pub const APP_NAME: &str = "Tandarust";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "tandarust_lib=info,tandarust=info,tower_http=warn"
}

/// Application data directory (`<platform data dir>/tandarust`).
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tandarust")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Supabase { url: String, service_key: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub ai_timeout: Duration,
    pub storage: StorageBackend,
    pub sqlite_path: PathBuf,
    pub image_dir: PathBuf,
    pub local_api_tokens: String,
    pub frontend_url: String,
    pub auth_cache_ttl: Duration,
    pub auth_cache_max_entries: usize,
    pub storage_retry: RetryPolicy,
}

impl Settings {
    /// Read settings from the process environment, seeded from `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("TANDARUST_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "TANDARUST_BIND",
            reason: format!("'{bind_raw}' is not a socket address"),
        })?;

        let gemini_api_key = get("GEMINI_API_KEY").ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let storage = match get("STORAGE_BACKEND").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("sqlite") => StorageBackend::Sqlite,
            Some("supabase") => StorageBackend::Supabase {
                url: get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
                service_key: get("SUPABASE_SERVICE_ROLE_KEY")
                    .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    reason: format!("expected 'sqlite' or 'supabase', got '{other}'"),
                })
            }
        };

        let data_dir = app_data_dir();

        Ok(Self {
            bind,
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            ai_timeout: Duration::from_secs(number(&get, "AI_TIMEOUT_SECS", 60)?),
            storage,
            sqlite_path: get("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("tandarust.db")),
            image_dir: get("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("images")),
            local_api_tokens: get("LOCAL_API_TOKENS").unwrap_or_default(),
            frontend_url: get("FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            auth_cache_ttl: Duration::from_secs(number(&get, "AUTH_CACHE_TTL_SECS", 30)?),
            auth_cache_max_entries: number(&get, "AUTH_CACHE_MAX_ENTRIES", 1024)? as usize,
            storage_retry: RetryPolicy {
                attempts: number(&get, "STORAGE_RETRY_ATTEMPTS", 3)? as u32,
                backoff: Duration::from_millis(number(&get, "STORAGE_RETRY_BACKOFF_MS", 250)?),
            },
        })
    }
}

fn number(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("'{raw}' is not a non-negative integer"),
        }),
    }
}
