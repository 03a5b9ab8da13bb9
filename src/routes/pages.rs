use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::blocking;
use crate::{
    error::AppError,
    models::{CellValue, DashboardPage, Filter, MoveDirection, Widget, WidgetPatch, WidgetType},
    services::pipeline::WidgetView,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pages", get(list_pages).post(create_page))
        .route("/pages/:id", patch(rename_page).delete(delete_page))
        .route("/pages/:id/render", get(render_page))
        .route("/pages/:id/filters", post(add_filter))
        .route("/pages/:id/filters/:filter_id", delete(remove_filter))
        .route("/pages/:id/filter-options", get(filter_options))
        .route("/pages/:id/widgets", post(add_widget))
        .route("/pages/:id/widgets/move", post(move_widget))
        .route(
            "/pages/:id/widgets/:widget_id",
            patch(update_widget).delete(remove_widget),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePage {
    name: Option<String>,
    initial_dataset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenamePage {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewFilter {
    column: String,
    #[serde(default)]
    value: CellValue,
}

#[derive(Debug, Deserialize)]
pub struct FilterOptionsQuery {
    column: Option<String>,
}

/// Columns available for filtering, plus the values of `column` when asked.
#[derive(Debug, Serialize)]
pub struct FilterOptions {
    columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWidget {
    dataset_id: String,
    #[serde(rename = "type")]
    kind: WidgetType,
}

#[derive(Debug, Deserialize)]
pub struct MoveWidget {
    index: usize,
    direction: MoveDirection,
}

async fn list_pages(State(state): State<Arc<AppState>>) -> Json<Vec<DashboardPage>> {
    Json(state.workspace.pages())
}

async fn create_page(
    State(state): State<Arc<AppState>>,
    request: Option<Json<CreatePage>>,
) -> Result<(StatusCode, Json<DashboardPage>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let workspace = state.workspace.clone();
    let page = blocking(move || {
        workspace.create_page(request.name.as_deref(), request.initial_dataset_id.as_deref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn rename_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenamePage>,
) -> Result<Json<DashboardPage>, AppError> {
    let workspace = state.workspace.clone();
    let page = blocking(move || workspace.rename_page(&id, &request.name)).await?;
    Ok(Json(page))
}

async fn delete_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let workspace = state.workspace.clone();
    blocking(move || workspace.delete_page(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn render_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WidgetView>>, AppError> {
    let start = std::time::Instant::now();
    let workspace = state.workspace.clone();
    let page_id = id.clone();
    let views = blocking(move || workspace.render_page(&page_id)).await?;
    tracing::debug!("Rendered {} widgets for page {} in {:?}", views.len(), id, start.elapsed());
    Ok(Json(views))
}

async fn add_filter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<NewFilter>,
) -> Result<(StatusCode, Json<Filter>), AppError> {
    let workspace = state.workspace.clone();
    let filter = blocking(move || workspace.add_filter(&id, &request.column, request.value)).await?;
    Ok((StatusCode::CREATED, Json(filter)))
}

async fn remove_filter(
    State(state): State<Arc<AppState>>,
    Path((id, filter_id)): Path<(String, String)>,
) -> Result<Json<DashboardPage>, AppError> {
    let workspace = state.workspace.clone();
    let page = blocking(move || workspace.remove_filter(&id, &filter_id)).await?;
    Ok(Json(page))
}

async fn filter_options(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FilterOptionsQuery>,
) -> Result<Json<FilterOptions>, AppError> {
    let workspace = state.workspace.clone();
    let options = blocking(move || {
        let columns = workspace.filter_columns(&id)?;
        let values = match query.column.filter(|c| !c.is_empty()) {
            Some(column) => Some(workspace.filter_values(&id, &column)?),
            None => None,
        };
        Ok(FilterOptions { columns, values })
    })
    .await?;
    Ok(Json(options))
}

async fn add_widget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<NewWidget>,
) -> Result<(StatusCode, Json<Widget>), AppError> {
    let workspace = state.workspace.clone();
    let widget = blocking(move || workspace.add_widget(&id, &request.dataset_id, request.kind)).await?;
    Ok((StatusCode::CREATED, Json(widget)))
}

async fn move_widget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<MoveWidget>,
) -> Result<Json<DashboardPage>, AppError> {
    let workspace = state.workspace.clone();
    let page = blocking(move || workspace.move_widget(&id, request.index, request.direction)).await?;
    Ok(Json(page))
}

async fn update_widget(
    State(state): State<Arc<AppState>>,
    Path((id, widget_id)): Path<(String, String)>,
    Json(patch): Json<WidgetPatch>,
) -> Result<Json<Widget>, AppError> {
    let workspace = state.workspace.clone();
    let widget = blocking(move || workspace.update_widget(&id, &widget_id, patch)).await?;
    Ok(Json(widget))
}

async fn remove_widget(
    State(state): State<Arc<AppState>>,
    Path((id, widget_id)): Path<(String, String)>,
) -> Result<Json<DashboardPage>, AppError> {
    let workspace = state.workspace.clone();
    let page = blocking(move || workspace.remove_widget(&id, &widget_id)).await?;
    Ok(Json(page))
}
