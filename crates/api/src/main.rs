mod cache;
mod config;
mod metrics;
mod retry;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Missing credentials or a bad value stop the process here, not per request
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let model = extract::GeminiClient::new(config.model.api_key.clone(), config.model.model.clone())
        .context("Failed to build Gemini client")?
        .with_base_url(config.model.base_url.clone());

    tracing::info!(
        mode = ?config.mode,
        model = %config.model.model,
        max_concurrent_llm_calls = config.concurrency.max_concurrent_llm_calls,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(AppState::new(config, Arc::new(model)));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
