/// Task endpoints
///
/// Every handler acts on behalf of the authenticated caller; a task owned by
/// someone else is reported as not found.

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use taskledger_shared::{
    auth::context::AuthContext,
    export::ExportFormat,
    models::task::TaskView,
    services::task::TaskRequest,
};
use uuid::Uuid;

/// Query string of the export endpoint
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// `csv` (default) or `json`
    pub format: Option<String>,
}

/// `GET /v1/tasks`
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TaskView>>> {
    Ok(Json(state.tasks.find_all_by_owner(&auth.username).await?))
}

/// `POST /v1/tasks`
///
/// Returns `201 Created` with the stored task.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskView>)> {
    validate_request(&req)?;

    let task = state.tasks.create(&auth.username, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /v1/tasks/:task_id`
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskView>> {
    Ok(Json(state.tasks.find_by_id(&auth.username, task_id).await?))
}

/// `PUT /v1/tasks/:task_id`
///
/// Replaces every mutable field; omitted optional fields are cleared.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<TaskRequest>,
) -> ApiResult<Json<TaskView>> {
    validate_request(&req)?;

    Ok(Json(state.tasks.update(&auth.username, task_id, req).await?))
}

/// `DELETE /v1/tasks/:task_id`
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.tasks.delete(&auth.username, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/tasks/today`
pub async fn due_today(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TaskView>>> {
    Ok(Json(state.tasks.find_due_today(&auth.username).await?))
}

/// `GET /v1/tasks/upcoming`
pub async fn upcoming(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TaskView>>> {
    Ok(Json(state.tasks.find_upcoming(&auth.username).await?))
}

/// `GET /v1/tasks/export?format=csv|json`
///
/// Responds with the document as an attachment.
pub async fn export_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ExportParams>,
) -> ApiResult<impl IntoResponse> {
    let format: ExportFormat = params.format.as_deref().unwrap_or("csv").parse()?;

    let body = state.tasks.export(&auth.username, format).await?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.file_name()),
            ),
        ],
        body,
    ))
}
