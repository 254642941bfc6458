//! Project write endpoints.
//!
//! Writes answer as soon as the store has dispatched them; the resulting
//! state arrives with a later `GET /api/state`.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::Project;
use crate::AppState;

/// Request body for creating a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Request body for renaming a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameProjectRequest {
    pub name: String,
}

fn require_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    Ok(())
}

/// POST /api/projects - Create a project. `data` is null when the write failed.
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Option<Project>> {
    require_name(&request.name)?;

    let project = state
        .store
        .create_project(request.name.trim(), request.url.as_deref())
        .await;
    success(project)
}

/// PATCH /api/projects/:id - Merge fields into a project.
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<()> {
    let Value::Object(fields) = body else {
        return Err(AppError::BadRequest(
            "Expected a JSON object of fields".to_string(),
        ));
    };

    state.store.update_project(&id, fields).await;
    success(())
}

/// PUT /api/projects/:id/name - Rename a project.
pub async fn rename_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameProjectRequest>,
) -> ApiResult<()> {
    require_name(&request.name)?;

    state.store.rename_project(&id, request.name.trim()).await;
    success(())
}

/// DELETE /api/projects/:id - Delete a project.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.store.delete_project(&id).await;
    success(())
}

/// POST /api/checklist/:item_key/toggle - Flip a checklist item on the active project.
pub async fn toggle_check_item(
    State(state): State<AppState>,
    Path(item_key): Path<String>,
) -> ApiResult<()> {
    state.store.toggle_check_item(&item_key).await;
    success(())
}
