pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod rate_limit;
pub mod session;
pub mod web;

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use config::Config;
use logging::LogSettings;
use model_gateway::HostModelGateway;
use web::AppState;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init(&LogSettings::from_env());

    let cfg = Config::from_env();
    info!(
        provider = cfg.model_provider.as_str(),
        model_base_url = %cfg.model_base_url,
        models = ?cfg.model_choices,
        model_timeout_secs = cfg.model_timeout_secs,
        quota_limit = cfg.quota.limit.get(),
        quota_window_secs = cfg.quota.window.num_seconds(),
        bind_addr = %cfg.bind_addr,
        default_api_key_set = cfg.default_api_key.is_some(),
        tracing_enabled = cfg.observability.is_enabled(),
        tracing_project = cfg.observability.project.as_deref().unwrap_or(""),
        "loaded runtime configuration"
    );
    if cfg.model_provider.requires_api_key() && cfg.default_api_key.is_none() {
        warn!("GROQ_API_KEY is not set; every question needs a key entered in the form");
    }

    let addr = cfg
        .socket_addr()
        .with_context(|| format!("Invalid BIND_ADDR='{}'", cfg.bind_addr))?;
    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.model_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;

    let cfg = Arc::new(cfg);
    let gateway = Arc::new(HostModelGateway::new(client, Arc::clone(&cfg)));
    let state = Arc::new(AppState::new(cfg, gateway)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "question form listening");

    axum::serve(listener, web::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
