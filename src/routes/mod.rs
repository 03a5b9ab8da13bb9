use std::sync::Arc;

use axum::{routing::get, Router};

use crate::error::AppError;
use crate::AppState;

pub mod backup;
pub mod datasets;
pub mod pages;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(datasets::routes())
        .merge(pages::routes())
        .merge(backup::routes())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Runs decoding and analysis work off the async executor.
pub(crate) async fn blocking<F, T>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("worker task failed: {}", e)))?
}
