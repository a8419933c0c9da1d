//! HTTP route handlers.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use ensemble_core::types::TaskPage;
use ensemble_tasks::{TaskCreation, TaskDetail};

use crate::dto::{
    CreateTaskRequest, DeleteResponse, PluginDto, ProvidersResponse, ReloadResponse,
    TaskListParams,
};
use crate::error::ApiError;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(task_detail).delete(delete_task))
        .route("/plugins", get(list_plugins))
        .route("/plugins/reload", post(reload_plugins))
        .route("/plugins/:id", get(plugin_detail))
        .route("/providers", get(list_providers))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Plan the request and persist the resulting task.
///
/// Planning failure is reported in the body (`success: false` plus the plan
/// diagnostics), not as an HTTP error; only persistence failures are errors.
async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<TaskCreation>, ApiError> {
    if request.user_input.trim().is_empty() {
        return Err(ApiError::InvalidArgument(
            "user_input must not be empty".to_string(),
        ));
    }
    let creation = state
        .service
        .create_task_from_input(&request.user_input, &state.router, request.user_id)
        .await?;
    Ok(Json(creation))
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<TaskPage>, ApiError> {
    let query = params.into_query()?;
    let page = state.service.query_tasks(&query).await?;
    Ok(Json(page))
}

async fn task_detail(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    state
        .service
        .get_task_detail(&task_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(task_id))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.service.delete_task(&task_id).await? {
        return Err(ApiError::NotFound(task_id));
    }
    info!(task_id = %task_id, "task deleted");
    Ok(Json(DeleteResponse { deleted: true }))
}

async fn list_plugins(State(state): State<AppState>) -> Json<Vec<PluginDto>> {
    let mut plugins = Vec::new();
    for id in state.plugins.list().await {
        if let Some(registration) = state.plugins.get_info(&id).await {
            plugins.push(PluginDto::from(&registration));
        }
    }
    Json(plugins)
}

async fn plugin_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PluginDto>, ApiError> {
    let registration = match state.plugins.get_info(&id).await {
        Some(registration) => registration,
        None => state
            .plugins
            .get_by_name(&id)
            .await
            .ok_or(ApiError::NotFound(id))?,
    };
    Ok(Json(PluginDto::from(&registration)))
}

async fn reload_plugins(State(state): State<AppState>) -> Json<ReloadResponse> {
    let reloaded = state.plugins.reload().await;
    Json(ReloadResponse { reloaded })
}

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        chain: state.completion.provider_names(),
        providers: state.completion.provider_status().to_vec(),
    })
}
