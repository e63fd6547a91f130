pub mod api;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod session_cache;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use api::{ApiContext, Backends};
use config::{Settings, StorageBackend};
use db::{
    DatabaseError, LocalImageStore, SqliteStore, SupabaseClient, SupabaseImageStore,
    SupabaseStore,
};
use identity::{IdentityError, IdentityProvider, StaticIdentityProvider, SupabaseIdentityProvider};
use pipeline::{GeminiClient, LlmError};
use session_cache::AuthCache;

/// Anything that stops the service from coming up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),
    #[error("Model client error: {0}")]
    Llm(#[from] LlmError),
    #[error("Server error: {0}")]
    Server(#[from] api::ServerError),
}

/// Wire storage, identity and the model client from settings.
pub fn build_context(settings: &Settings) -> Result<ApiContext, StartupError> {
    let timeout_secs = settings.ai_timeout.as_secs().max(1);

    let (backends, identity): (Backends, Arc<dyn IdentityProvider>) = match &settings.storage {
        StorageBackend::Sqlite => {
            let store = Arc::new(SqliteStore::open(
                &settings.sqlite_path,
                settings.storage_retry,
            )?);
            let identity = StaticIdentityProvider::parse(&settings.local_api_tokens)?;
            if identity.is_empty() {
                tracing::warn!("No LOCAL_API_TOKENS configured; every protected route will return 401");
            }
            tracing::info!(path = %settings.sqlite_path.display(), "Using SQLite storage");
            (
                Backends {
                    patients: store.clone(),
                    prescriptions: store,
                    images: Arc::new(LocalImageStore::new(settings.image_dir.clone())),
                },
                Arc::new(identity),
            )
        }
        StorageBackend::Supabase { url, service_key } => {
            let client = SupabaseClient::new(url, service_key, timeout_secs)?;
            let store = Arc::new(SupabaseStore::new(client.clone(), settings.storage_retry));
            tracing::info!(url = %url, "Using Supabase storage");
            (
                Backends {
                    patients: store.clone(),
                    prescriptions: store,
                    images: Arc::new(SupabaseImageStore::new(client.clone())),
                },
                Arc::new(SupabaseIdentityProvider::new(client)),
            )
        }
    };

    let llm = GeminiClient::new(
        &settings.gemini_base_url,
        &settings.gemini_model,
        &settings.gemini_api_key,
        timeout_secs,
    )?;

    Ok(ApiContext::new(
        backends,
        Arc::new(llm),
        identity,
        AuthCache::new(settings.auth_cache_ttl, settings.auth_cache_max_entries),
        settings.ai_timeout,
    ))
}

/// Service entry point: load settings, wire backends, serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let settings = Settings::from_env()?;
    let ctx = build_context(&settings)?;
    let app = api::api_router(ctx, &settings.frontend_url);

    let mut server = api::start_server(&settings.bind.to_string(), app).await?;
    tracing::info!(addr = %server.addr(), model = %settings.gemini_model, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C, shutting down");
    }
    server.shutdown();
    server.stopped().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
