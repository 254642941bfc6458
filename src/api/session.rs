//! Store state, identity and selection endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{Identity, StoreState};
use crate::AppState;

/// Request body for changing the active project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// GET /api/state - Current projects, selection, loading and error state.
pub async fn get_state(State(state): State<AppState>) -> ApiResult<StoreState> {
    success(state.store.state())
}

/// PUT /api/session - Sign in as an identity, replacing any previous one.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(identity): Json<Identity>,
) -> ApiResult<StoreState> {
    if identity.uid.trim().is_empty() {
        return Err(AppError::Validation("uid is required".to_string()));
    }

    state.store.set_identity(Some(identity)).await;
    success(state.store.state())
}

/// DELETE /api/session - Sign out and tear down subscriptions.
pub async fn sign_out(State(state): State<AppState>) -> ApiResult<StoreState> {
    state.store.set_identity(None).await;
    success(state.store.state())
}

/// PUT /api/active - Select the active project.
pub async fn set_active(
    State(state): State<AppState>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<StoreState> {
    if let Some(id) = &request.id {
        if state.store.state().project(id).is_none() {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }
    }

    state.store.set_active_project_id(request.id).await;
    success(state.store.state())
}
