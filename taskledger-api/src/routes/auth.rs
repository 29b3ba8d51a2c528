/// Authentication endpoints
///
/// - `POST /v1/auth/login` - Exchange username and password for tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new access token
///
/// Accounts are created by administrators through `/v1/users`; there is no
/// self-registration.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskledger_shared::auth::jwt;
use tracing::info;
use validator::Validate;

/// Login request
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,

    /// Always "Bearer"
    pub token_type: String,

    pub username: String,

    pub roles: Vec<String>,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// {
///   "username": "alice",
///   "password": "secret123"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Missing username or password
/// - `401 Unauthorized`: Unknown user, inactive user or wrong password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    validate_request(&req)?;

    let authenticated = state
        .users
        .verify_credentials(&req.username, &req.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    let access_claims = jwt::Claims::new(
        &authenticated.username,
        authenticated.roles.clone(),
        jwt::TokenType::Access,
    );
    let refresh_claims = jwt::Claims::new(
        &authenticated.username,
        authenticated.roles.clone(),
        jwt::TokenType::Refresh,
    );

    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;
    let refresh_token = jwt::create_token(&refresh_claims, state.jwt_secret())?;

    info!(username = %authenticated.username, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        username: authenticated.username,
        roles: authenticated.roles,
    }))
}

/// Token refresh endpoint
///
/// # Errors
///
/// The new access token carries the user's current roles.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired or non-refresh token, or the user
///   has since been deleted or deactivated
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;
    let user = state.active_user(&claims.sub).await?;

    let access_claims = jwt::Claims::new(user.username, user.roles, jwt::TokenType::Access);
    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}
