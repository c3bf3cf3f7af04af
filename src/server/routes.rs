use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::hub::NO_SESSION;
use super::AppState;
use crate::db::ListError;
use crate::models::{Item, ListSummary, TodoList};
use crate::sync::{StoreError, SyncError, SyncRequest, SyncResponse};

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

/// A failed API request, mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
    index: Option<usize>,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
            index: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
                index: self.index,
            }),
        )
            .into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
            SyncError::Validation { .. } => StatusCode::BAD_REQUEST,
            SyncError::StoreUnavailable { .. } | SyncError::ReadFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            error: e.kind(),
            index: e.index(),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::warn!("Store error: {}", e);
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
    }
}

impl From<ListError> for ApiError {
    fn from(e: ListError) -> Self {
        match e {
            ListError::DuplicateName(_) => {
                Self::new(StatusCode::CONFLICT, "duplicate_name", e.to_string())
            }
            ListError::EmptyName => Self::new(StatusCode::BAD_REQUEST, "validation", e.to_string()),
            ListError::Store(store) => store.into(),
        }
    }
}

/// A list with its items, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListView {
    pub id: String,
    pub name: String,
    pub items: Vec<Item>,
}

impl From<TodoList> for ListView {
    fn from(list: TodoList) -> Self {
        Self {
            id: list.id,
            name: list.name,
            items: list.items,
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::version(),
    })
}

pub async fn get_lists(State(state): State<AppState>) -> Result<Json<Vec<ListSummary>>, ApiError> {
    Ok(Json(state.repo.list_for_owner(&state.owner).await?))
}

pub async fn get_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListView>, ApiError> {
    match state.repo.get(&id).await? {
        Some(list) => Ok(Json(list.into())),
        None => Err(ApiError::not_found(format!("list not found: {}", id))),
    }
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    id: String,
}

pub async fn add_list(
    State(state): State<AppState>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let list = state.repo.create(&request.name, &state.owner).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: list.id })))
}

pub async fn rename_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<NameRequest>,
) -> Result<StatusCode, ApiError> {
    if state.repo.rename(&id, &request.name).await? {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found(format!("list not found: {}", id)))
    }
}

/// Applies a batch and returns the list's items read back afterwards.
pub async fn sync_items(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let result = state.engine.apply_wire(&request.list_id, request.ops).await;

    // Earlier operations may have landed even when the batch failed part way
    if !matches!(result, Err(SyncError::NotFound { .. })) {
        state.hub.broadcast(&request.list_id, NO_SESSION).await;
    }

    Ok(Json(SyncResponse { items: result? }))
}
