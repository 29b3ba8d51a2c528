//! Common test utilities for the shared crate's integration tests
//!
//! Every test gets its own in-memory database with migrations applied, the
//! system principal in place, and services wired to a low-cost hasher.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use taskledger_shared::audit::AuditService;
use taskledger_shared::auth::password::{Argon2Hasher, CredentialHasher, HashParams};
use taskledger_shared::db::migrations::run_migrations;
use taskledger_shared::db::pool::{create_pool, DatabaseConfig};
use taskledger_shared::models::audit_log::AuditLog;
use taskledger_shared::models::user::{User, UserView};
use taskledger_shared::services::task::{TaskRequest, TaskService};
use taskledger_shared::services::user::{RegisterUser, UserService};

pub const PASSWORD: &str = "secret123";

/// Test context containing the pool and every service
pub struct TestContext {
    pub pool: SqlitePool,
    pub tasks: TaskService,
    pub users: UserService,
    pub audit: AuditService,
}

impl TestContext {
    /// Fresh database with the system principal created
    pub async fn new() -> Self {
        let ctx = Self::without_system_principal().await;
        ctx.users
            .ensure_system_principal()
            .await
            .expect("Failed to create system principal");
        ctx
    }

    /// Fresh, migrated database with no users at all
    pub async fn without_system_principal() -> Self {
        Self::with_config(DatabaseConfig::in_memory()).await
    }

    /// Migrated database behind `config`, with no users
    pub async fn with_config(config: DatabaseConfig) -> Self {
        let pool = create_pool(config).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::new(HashParams::low_cost()));

        Self {
            tasks: TaskService::new(pool.clone()),
            users: UserService::new(pool.clone(), hasher),
            audit: AuditService::new(pool.clone()),
            pool,
        }
    }

    /// Registers `username` with email `<username>@x.com` and the default role
    pub async fn register(&self, username: &str) -> UserView {
        self.users
            .register(register_request(username))
            .await
            .expect("Failed to register user")
    }

    pub async fn audit_count(&self) -> i64 {
        let mut conn = self.pool.acquire().await.unwrap();
        AuditLog::count(&mut conn).await.unwrap()
    }

    pub async fn user_count(&self) -> i64 {
        let mut conn = self.pool.acquire().await.unwrap();
        User::count(&mut conn).await.unwrap()
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

pub fn task_request(name: &str, due_date: DateTime<Utc>, status: &str) -> TaskRequest {
    TaskRequest {
        name: name.to_string(),
        description: None,
        category: None,
        due_date: Some(due_date),
        status: status.to_string(),
    }
}

/// `hour:00` of the current local day, as UTC
pub fn today_at(hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
    let naive = Local::now().date_naive().and_time(time);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap()
        .with_timezone(&Utc)
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}
