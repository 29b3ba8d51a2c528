/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskledger_api::{app::AppState, config::Config};
/// use taskledger_shared::auth::password::{Argon2Hasher, HashParams};
/// use sqlx::SqlitePool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = SqlitePool::connect(&config.database.url).await?;
/// let hasher = Arc::new(Argon2Hasher::new(HashParams::default()));
/// let state = AppState::new(pool, config, hasher);
/// let app = taskledger_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::{BootstrapAdmin, Config},
    error::ApiError,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Extension, Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use taskledger_shared::{
    audit::AuditService,
    auth::{context::AuthContext, jwt, password::CredentialHasher},
    error::ServiceResult,
    models::{role::RoleName, user::UserView},
    services::{
        task::TaskService,
        user::{RegisterUser, UserService},
    },
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is a pool handle or an `Arc`, so cloning is shallow.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    /// Application configuration
    pub config: Arc<Config>,

    pub tasks: TaskService,

    pub users: UserService,

    pub audit: AuditService,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: SqlitePool, config: Config, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            tasks: TaskService::new(db.clone()),
            users: UserService::new(db.clone(), hasher),
            audit: AuditService::new(db.clone()),
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Reloads the subject of a validated token
    ///
    /// Tokens outlive account changes, so a deleted or deactivated user is
    /// rejected here and the stored roles replace the ones in the token.
    pub async fn active_user(&self, username: &str) -> Result<UserView, ApiError> {
        match self.users.find_by_username(username).await? {
            Some(user) if user.active => Ok(user),
            Some(_) => {
                warn!(%username, "Token presented for inactive user");
                Err(ApiError::Unauthorized("User is inactive".to_string()))
            }
            None => {
                warn!(%username, "Token presented for unknown user");
                Err(ApiError::Unauthorized("User no longer exists".to_string()))
            }
        }
    }
}

/// Registers the configured administrator unless the username is taken
///
/// Returns the new account, or `None` when it already existed.
pub async fn bootstrap_admin(
    users: &UserService,
    admin: &BootstrapAdmin,
) -> ServiceResult<Option<UserView>> {
    if users.exists_by_username(&admin.username).await? {
        info!(username = %admin.username, "Bootstrap administrator already exists");
        return Ok(None);
    }

    let view = users
        .register(RegisterUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            roles: Some(vec![RoleName::Admin.as_str().to_string()]),
        })
        .await?;

    info!(username = %view.username, "Bootstrap administrator created");
    Ok(Some(view))
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                        # Health check (public)
/// └── /v1/
///     ├── /auth/                     # Public
///     │   ├── POST /login
///     │   └── POST /refresh
///     ├── /tasks/                    # Authenticated, scoped to the caller
///     │   ├── GET, POST /
///     │   ├── GET /today
///     │   ├── GET /upcoming
///     │   ├── GET /export?format=csv|json
///     │   └── GET, PUT, DELETE /:task_id
///     ├── /users/                    # ROLE_ADMIN
///     │   ├── GET, POST /
///     │   ├── PUT, DELETE /:user_id
///     │   ├── POST /:user_id/activate
///     │   └── POST /:user_id/deactivate
///     └── /audit-logs/               # ROLE_ADMIN
///         ├── GET /entity/:entity_type/:entity_id
///         └── GET /user/:username
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication and role checks (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let auth_routes = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let task_routes = Router::new()
        .route(
            "/",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route("/today", get(routes::tasks::due_today))
        .route("/upcoming", get(routes::tasks::upcoming))
        .route("/export", get(routes::tasks::export_tasks))
        .route(
            "/:task_id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let user_routes = Router::new()
        .route(
            "/",
            get(routes::users::list_users).post(routes::users::register_user),
        )
        .route(
            "/:user_id",
            put(routes::users::update_user).delete(routes::users::delete_user),
        )
        .route("/:user_id/activate", post(routes::users::activate_user))
        .route("/:user_id/deactivate", post(routes::users::deactivate_user))
        .layer(axum::middleware::from_fn(require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let audit_routes = Router::new()
        .route(
            "/entity/:entity_type/:entity_id",
            get(routes::audit_logs::list_by_entity),
        )
        .route("/user/:username", get(routes::audit_logs::list_by_actor))
        .layer(axum::middleware::from_fn(require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Build complete v1 API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/tasks", task_routes)
        .nest("/users", user_routes)
        .nest("/audit-logs", audit_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Extracts and validates JWT token from Authorization header, reloads the
/// user it names, then injects AuthContext into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    let claims = jwt::validate_access_token(token, state.jwt_secret())?;
    let user = state.active_user(&claims.sub).await?;

    req.extensions_mut().insert(AuthContext::from(user));

    Ok(next.run(req).await)
}

/// Rejects callers without `ROLE_ADMIN`
///
/// Must run inside `jwt_auth_layer`.
async fn require_admin(
    Extension(auth): Extension<AuthContext>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "Administrator role required".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
