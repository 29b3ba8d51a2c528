//! Common test utilities for the API integration tests
//!
//! Each `TestContext` owns a router over a private in-memory database with
//! the system principal, an administrator (`admin`) and a regular user
//! (`alice`) already registered.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use taskledger_api::app::{build_router, AppState};
use taskledger_api::config::Config;
use taskledger_shared::auth::jwt::{create_token, Claims, TokenType};
use taskledger_shared::auth::password::{Argon2Hasher, HashParams};
use taskledger_shared::db::migrations::run_migrations;
use taskledger_shared::db::pool::{create_pool, DatabaseConfig};
use taskledger_shared::models::user::UserView;
use taskledger_shared::services::user::RegisterUser;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const PASSWORD: &str = "secret123";

/// Test context containing the app, its state and ready-made tokens
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub admin: UserView,
    pub alice: UserView,
    pub admin_token: String,
    pub alice_token: String,
}

impl TestContext {
    pub async fn new() -> Self {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", JWT_SECRET),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("Failed to build config");

        let pool = create_pool(DatabaseConfig::in_memory())
            .await
            .expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let state = AppState::new(
            pool,
            config,
            Arc::new(Argon2Hasher::new(HashParams::low_cost())),
        );
        state
            .users
            .ensure_system_principal()
            .await
            .expect("Failed to create system principal");

        let admin = state
            .users
            .register(RegisterUser {
                roles: Some(vec!["admin".to_string()]),
                ..register_request("admin")
            })
            .await
            .expect("Failed to register admin");
        let alice = state
            .users
            .register(register_request("alice"))
            .await
            .expect("Failed to register alice");

        let admin_token = token_for(&admin);
        let alice_token = token_for(&alice);

        Self {
            app: build_router(state.clone()),
            state,
            admin,
            alice,
            admin_token,
            alice_token,
        }
    }

    /// Registers another regular user and returns an access token for them
    pub async fn user_with_token(&self, username: &str) -> (UserView, String) {
        let user = self
            .state
            .users
            .register(register_request(username))
            .await
            .expect("Failed to register user");
        let token = token_for(&user);
        (user, token)
    }

    /// Sends a request and decodes the JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response body is not JSON")
        };
        (status, json)
    }

    /// Sends a request and returns status, headers and the raw body
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        (status, headers, bytes.to_vec())
    }
}

pub fn register_request(username: &str) -> RegisterUser {
    RegisterUser {
        username: username.to_string(),
        email: format!("{}@x.com", username),
        password: PASSWORD.to_string(),
        roles: None,
    }
}

pub fn token_for(user: &UserView) -> String {
    let claims = Claims::new(&user.username, user.roles.clone(), TokenType::Access);
    create_token(&claims, JWT_SECRET).expect("Failed to create token")
}
