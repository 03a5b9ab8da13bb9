use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, http::Method, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::workspace::Workspace;

// Application state
pub struct AppState {
    pub config: Config,
    pub workspace: Arc<Workspace>,
}

impl AppState {
    pub fn new(config: Config, workspace: Workspace) -> Self {
        Self {
            config,
            workspace: Arc::new(workspace),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.config.max_file_size;

    routes::routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
