use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::blocking;
use crate::{
    error::AppError,
    models::{Dataset, DatasetSummary},
    services::excel::cleaner::CleanOptions,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/datasets", get(list_datasets).post(upload_dataset))
        .route(
            "/datasets/:id",
            get(get_dataset).patch(update_dataset).delete(delete_dataset),
        )
        .route("/datasets/:id/rows", put(refresh_dataset))
        .route("/datasets/:id/clean", post(clean_dataset))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    file_name: String,
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DatasetUpdate {
    folder: Option<String>,
}

async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<Vec<DatasetSummary>> {
    Json(state.workspace.dataset_summaries())
}

async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<DatasetSummary>), AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("No file provided".to_string()));
    }
    tracing::info!("Upload of {} ({}KB)", params.file_name, body.len() / 1024);

    let workspace = state.workspace.clone();
    let summary = blocking(move || {
        workspace.import_dataset(&params.file_name, body, params.folder)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Dataset>, AppError> {
    Ok(Json(state.workspace.dataset(&id)?))
}

async fn update_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<DatasetUpdate>,
) -> Result<Json<DatasetSummary>, AppError> {
    Ok(Json(state.workspace.set_dataset_folder(&id, update.folder)?))
}

async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.workspace.delete_dataset(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RefreshParams>,
    body: Bytes,
) -> Result<Json<DatasetSummary>, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("No file provided".to_string()));
    }

    let workspace = state.workspace.clone();
    let summary = blocking(move || workspace.refresh_dataset(&id, &params.file_name, body)).await?;
    Ok(Json(summary))
}

async fn clean_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    options: Option<Json<CleanOptions>>,
) -> Result<Json<DatasetSummary>, AppError> {
    let options = options.map(|Json(o)| o).unwrap_or_default();

    let workspace = state.workspace.clone();
    let summary = blocking(move || workspace.clean_dataset(&id, options)).await?;
    Ok(Json(summary))
}
