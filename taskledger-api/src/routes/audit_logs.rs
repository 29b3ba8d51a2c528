/// Audit log queries (admin only)
///
/// Entries are returned newest first.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Json,
};
use taskledger_shared::models::audit_log::{AuditLog, EntityType};
use uuid::Uuid;

/// `GET /v1/audit-logs/entity/:entity_type/:entity_id`
///
/// `entity_type` is `task` or `user`, case-insensitive. Any other value is
/// `404 Not Found`.
pub async fn list_by_entity(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    let entity_type: EntityType = entity_type.parse().map_err(ApiError::NotFound)?;

    Ok(Json(state.audit.list_by_entity(entity_type, entity_id).await?))
}

/// `GET /v1/audit-logs/user/:username`
///
/// Entries written by `username`; `404 Not Found` if the user does not exist.
pub async fn list_by_actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    Ok(Json(state.audit.list_by_actor(&username).await?))
}
