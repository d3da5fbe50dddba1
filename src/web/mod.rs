mod handlers;
pub mod page;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use minijinja::Environment;

use crate::config::Config;
use crate::model_gateway::ModelGateway;
use crate::session::SessionStore;

pub struct AppState {
    pub cfg: Arc<Config>,
    pub sessions: SessionStore,
    pub gateway: Arc<dyn ModelGateway>,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, gateway: Arc<dyn ModelGateway>) -> anyhow::Result<Self> {
        let templates = page::templates()?;
        Ok(Self {
            sessions: SessionStore::new(cfg.quota),
            cfg,
            gateway,
            templates,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/ask", post(handlers::ask))
        .route("/health", get(handlers::health))
        .with_state(state)
}
