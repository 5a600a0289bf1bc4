pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod models;
pub mod providers;
pub mod service;
pub mod store;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::cache::{RateCache, RedisCache};
use crate::providers::CbrProvider;
use crate::service::ExchangeService;
use crate::store::RateStore;

/// Days of history warmed by the one-shot startup preload.
const STARTUP_PRELOAD_DAYS: u32 = 180;

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("kursd starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = RateStore::open(&config.database.path).await?;
    let cache: Arc<dyn RateCache> = Arc::new(RedisCache::new(&config.redis)?);
    let provider = CbrProvider::new(&config.feed.base_url);
    let service = Arc::new(ExchangeService::new(provider, store.clone(), cache));

    // One-time schema creation and the startup preload run off the request
    // path; their failure is logged but never blocks the API.
    let init_service = Arc::clone(&service);
    tokio::spawn(async move {
        if let Err(err) = store.ensure_schema().await {
            warn!(error = %err, "Schema initialization failed");
            return;
        }
        init_service
            .preload_historical_data(STARTUP_PRELOAD_DAYS)
            .await;
    });

    let router = api::app_router(Arc::new(AppState { service }));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("Listening on {}", config.server.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
