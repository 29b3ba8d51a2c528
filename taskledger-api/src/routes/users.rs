/// User administration endpoints
///
/// All routes require `ROLE_ADMIN`. User mutations are attributed to the
/// system principal in the audit log.

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use taskledger_shared::{
    auth::context::AuthContext,
    models::user::UserView,
    services::user::{RegisterUser, UpdateUser},
};
use tracing::info;
use uuid::Uuid;

/// `GET /v1/users`
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserView>>> {
    Ok(Json(state.users.get_all().await?))
}

/// `POST /v1/users`
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Invalid fields or unknown role
/// - `409 Conflict`: Username or email already in use
pub async fn register_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RegisterUser>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    validate_request(&req)?;

    let user = state.users.register(req).await?;
    info!(admin = %auth.username, username = %user.username, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /v1/users/:user_id`
///
/// Partial update; absent fields are left unchanged.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUser>,
) -> ApiResult<Json<UserView>> {
    validate_request(&req)?;

    Ok(Json(state.users.update(user_id, req).await?))
}

/// `DELETE /v1/users/:user_id`
///
/// Users that own tasks or appear in the audit log cannot be deleted
/// (`409 Conflict`); deactivate them instead.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.users.delete(user_id).await?;
    info!(admin = %auth.username, %user_id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/users/:user_id/activate`
pub async fn activate_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.users.activate(user_id).await?))
}

/// `POST /v1/users/:user_id/deactivate`
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.users.deactivate(user_id).await?))
}
