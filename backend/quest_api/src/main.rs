//! Quest API: entry point.
//!
//! Hosts the quest engine behind a small Axum REST API. A background
//! notifier task appends every committed engine event to SQLite so the
//! activity history can be queried after the fact.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod notifier;

use std::sync::Arc;
use std::time::Duration;

use quest_engine::{
    EngineConfig, LocalCacheRepository, Quest, QuestEngine, QuestRepository,
    RemoteQuestRepository,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, StorageBackend};
use errors::{Result, ServiceError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite event log and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let repository = build_repository(&config).await?;
    let engine = Arc::new(QuestEngine::new(
        repository,
        EngineConfig {
            completion_policy: config.completion_policy,
            event_buffer: config.event_buffer,
        },
    ));

    if let Some(path) = &config.seed_file {
        seed_quests(&engine, path).await?;
    }

    // ─── Background notifier ──────────────────────────────
    let cancel = CancellationToken::new();
    let notifier = tokio::spawn(notifier::run(
        pool.clone(),
        engine.subscribe(),
        cancel.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { engine, pool });
    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Err(e) = notifier.await {
        warn!("Notifier task ended abnormally: {e}");
    }
    info!("Shutdown complete");
    Ok(())
}

async fn build_repository(config: &Config) -> Result<Arc<dyn QuestRepository>> {
    match config.storage_backend {
        StorageBackend::Local => {
            let quota = config.local_cache_quota_bytes;
            let repo = match &config.local_cache_path {
                Some(path) => {
                    info!("Using local cache at {path} (quota {quota} bytes)");
                    LocalCacheRepository::open(path, quota).await?
                }
                None => {
                    info!("Using in-memory local cache (quota {quota} bytes)");
                    LocalCacheRepository::in_memory(quota)
                }
            };
            Ok(Arc::new(repo))
        }
        StorageBackend::Remote => {
            let url = config.remote_store_url.clone().ok_or_else(|| {
                ServiceError::Config("REMOTE_STORE_URL is required".to_string())
            })?;
            let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
            info!("Using remote record store at {url}");
            let mut repo = RemoteQuestRepository::new(client, url);
            if let Some(limit) = config.remote_max_record_bytes {
                repo = repo.with_max_record_bytes(limit);
            }
            Ok(Arc::new(repo))
        }
    }
}

/// Register every quest in a JSON array file. Quests already present in
/// storage are left untouched.
async fn seed_quests(engine: &QuestEngine, path: &str) -> Result<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let quests: Vec<Quest> = serde_json::from_str(&raw)?;

    let mut registered = 0usize;
    for quest in quests {
        if engine.quest(&quest.id).await.is_ok() {
            info!("Seed quest {} already stored; skipping", quest.id);
            continue;
        }
        engine.register_quest(quest).await?;
        registered += 1;
    }
    info!("Seeded {registered} quest(s) from {path}");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Could not listen for shutdown signal: {e}");
                // Keep serving until cancelled some other way.
                cancel.cancelled().await;
            }
            info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
