use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::blocking;
use crate::{
    error::AppError,
    services::backup::ImportSummary,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/backup", get(export_backup).post(import_backup))
}

async fn export_backup(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let backup = state.workspace.export_backup();
    let body = serde_json::to_string_pretty(&backup)?;
    tracing::info!(
        "Exporting backup with {} datasets and {} pages",
        backup.datasets.len(),
        backup.pages.len()
    );

    let disposition = format!("attachment; filename=\"{}\"", backup.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn import_backup(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ImportSummary>, AppError> {
    let workspace = state.workspace.clone();
    let summary = blocking(move || workspace.import_backup(&body)).await?;
    Ok(Json(summary))
}
