/// User model and database operations
///
/// Row-level access to user accounts. Business rules (uniqueness pre-checks,
/// partial updates, audit pairing) live in `services::user`; everything here
/// runs on a caller-supplied connection so it can join the caller's
/// transaction.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id BLOB PRIMARY KEY NOT NULL,
///     username TEXT NOT NULL,
///     email TEXT NOT NULL,
///     password_hash TEXT NOT NULL,
///     active INTEGER NOT NULL DEFAULT 1,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// CREATE UNIQUE INDEX users_username_key ON users (username);
/// CREATE UNIQUE INDEX users_email_key ON users (email);
/// ```
///
/// # Example
///
/// ```no_run
/// use taskledger_shared::models::user::{CreateUser, User};
/// use taskledger_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::in_memory()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let user = User::create(&mut conn, CreateUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let found = User::find_by_username(&mut conn, "alice").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::role::RoleName;

/// User account row
///
/// `password_hash` is an opaque string produced by a
/// [`CredentialHasher`](crate::auth::password::CredentialHasher); it is
/// skipped when serializing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Login name, unique across all users
    pub username: String,

    /// Email address, unique across all users
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Inactive users keep their data but cannot log in
    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,

    /// Hashed credential (NOT plaintext)
    pub password_hash: String,
}

/// Audit snapshot of a user
///
/// Field order is the serialization order, so snapshots of the same state
/// always render identically. Roles are sorted; the credential hash is never
/// included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub roles: Vec<String>,
}

/// Read view of a user, returned by the user service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn role_names(roles: &BTreeSet<RoleName>) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

impl User {
    /// Snapshot of this user with the given role set
    pub fn snapshot(&self, roles: &BTreeSet<RoleName>) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            active: self.active,
            roles: role_names(roles),
        }
    }

    /// View of this user with the given role set
    pub fn view(&self, roles: &BTreeSet<RoleName>) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            active: self.active,
            roles: role_names(roles),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Inserts a new active user
    ///
    /// # Errors
    ///
    /// Returns a database error if the username or email violates a unique
    /// index.
    pub async fn create(conn: &mut SqliteConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        let now = Utc::now();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            RETURNING id, username, email, password_hash, active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.username)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_username(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(conn)
        .await
    }

    pub async fn exists_by_username(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
            .bind(username)
            .fetch_one(conn)
            .await
    }

    pub async fn exists_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
            .bind(email)
            .fetch_one(conn)
            .await
    }

    /// Lists all users ordered by username
    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            ORDER BY username ASC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Writes every mutable column of `user` back to its row
    ///
    /// `updated_at` is refreshed; the returned row is the stored state.
    ///
    /// # Errors
    ///
    /// `sqlx::Error::RowNotFound` if the user no longer exists.
    pub async fn save(conn: &mut SqliteConnection, user: &User) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = ?, email = ?, password_hash = ?, active = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, username, email, password_hash, active, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(Utc::now())
        .bind(user.id)
        .fetch_one(conn)
        .await
    }

    /// Deletes a user row
    ///
    /// Role memberships cascade. Returns `false` if no row matched.
    pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Total number of users
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(conn)
            .await
    }
}
