/// Role reference data
///
/// Roles are a closed set seeded by the initial migration. The core never
/// creates or mutates them; it only resolves requested role names to rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE roles (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL UNIQUE
/// );
///
/// CREATE TABLE user_roles (
///     user_id BLOB NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     role_id INTEGER NOT NULL REFERENCES roles (id),
///     PRIMARY KEY (user_id, role_id)
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// The closed set of role identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleName {
    #[serde(rename = "ROLE_USER")]
    User,

    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl RoleName {
    /// Name as stored in the `roles` table
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::User => "ROLE_USER",
            RoleName::Admin => "ROLE_ADMIN",
        }
    }

    /// Parses a stored role name
    pub fn from_db(name: &str) -> Option<Self> {
        match name {
            "ROLE_USER" => Some(RoleName::User),
            "ROLE_ADMIN" => Some(RoleName::Admin),
            _ => None,
        }
    }

    /// Resolves a requested role name, case-insensitively
    ///
    /// Accepts the short forms (`user`, `admin`) and the stored forms
    /// (`ROLE_USER`, `ROLE_ADMIN`). Anything else is rejected rather than
    /// silently mapped to a default role.
    pub fn resolve(requested: &str) -> Option<Self> {
        match requested.trim().to_ascii_lowercase().as_str() {
            "user" | "role_user" => Some(RoleName::User),
            "admin" | "role_admin" => Some(RoleName::Admin),
            _ => None,
        }
    }

    /// Resolves a list of requested names into a role set
    ///
    /// Returns the first unrecognized name on failure.
    pub fn resolve_all<'a, I>(requested: I) -> Result<BTreeSet<RoleName>, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        requested
            .into_iter()
            .map(|name| RoleName::resolve(name).ok_or_else(|| name.clone()))
            .collect()
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

impl Role {
    /// Finds a role row by name
    pub async fn find_by_name(
        conn: &mut SqliteConnection,
        name: RoleName,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(conn)
            .await
    }

    /// Role names currently assigned to a user
    pub async fn names_for_user(
        conn: &mut SqliteConnection,
        user_id: Uuid,
    ) -> Result<BTreeSet<RoleName>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(names.iter().filter_map(|n| RoleName::from_db(n)).collect())
    }

    /// Replaces a user's role memberships with the given role rows
    pub async fn replace_for_user(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        roles: &[Role],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        for role in roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(role.id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}
