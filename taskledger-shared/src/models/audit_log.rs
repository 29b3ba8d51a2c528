/// Audit log model and database operations
///
/// Append-only record of entity mutations. Rows are inserted once and never
/// updated or deleted; storage triggers reject both, so the write-once rule
/// holds even for direct SQL.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE audit_logs (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     action TEXT NOT NULL,
///     entity_type TEXT NOT NULL,
///     entity_id BLOB NOT NULL,
///     old_value TEXT,
///     new_value TEXT,
///     changed_by BLOB NOT NULL REFERENCES users (id),
///     changed_at TEXT NOT NULL
/// );
/// ```
///
/// # Ordering
///
/// Newest first is `changed_at DESC, id DESC`: the autoincrement id breaks
/// ties between entries written within the same clock tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Activate,
    Deactivate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Activate => "ACTIVATE",
            AuditAction::Deactivate => "DEACTIVATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical name of an audited entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Task,
    User,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "TASK",
            EntityType::User => "USER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    /// Case-insensitive: `task`, `TASK` and `Task` all parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TASK" => Ok(EntityType::Task),
            "USER" => Ok(EntityType::User),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

/// Audit log row, joined with the actor's username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    /// Monotonic surrogate ID
    pub id: i64,

    pub action: AuditAction,

    pub entity_type: EntityType,

    pub entity_id: Uuid,

    /// Serialized snapshot before the mutation (None for CREATE)
    pub old_value: Option<String>,

    /// Serialized snapshot after the mutation (None for DELETE)
    pub new_value: Option<String>,

    /// Actor user ID
    pub changed_by: Uuid,

    /// Actor username at read time
    pub changed_by_username: String,

    pub changed_at: DateTime<Utc>,
}

/// Input for appending an audit entry
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}

const SELECT_AUDIT_LOG: &str = r#"
    SELECT a.id, a.action, a.entity_type, a.entity_id, a.old_value, a.new_value,
           a.changed_by, u.username AS changed_by_username, a.changed_at
    FROM audit_logs a
    JOIN users u ON u.id = a.changed_by
"#;

impl AuditLog {
    /// Inserts one audit row and returns its ID
    ///
    /// # Errors
    ///
    /// A foreign-key violation if `changed_by` does not reference a user.
    pub async fn append(conn: &mut SqliteConnection, entry: NewAuditLog) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO audit_logs (action, entity_type, entity_id, old_value, new_value, changed_by, changed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.old_value)
        .bind(entry.new_value)
        .bind(entry.changed_by)
        .bind(entry.changed_at)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(&format!("{} WHERE a.id = ?", SELECT_AUDIT_LOG))
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// History of one entity, newest first
    pub async fn list_by_entity(
        conn: &mut SqliteConnection,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            "{} WHERE a.entity_type = ? AND a.entity_id = ? ORDER BY a.changed_at DESC, a.id DESC",
            SELECT_AUDIT_LOG
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(conn)
        .await
    }

    /// Everything one actor did, newest first
    pub async fn list_by_actor(
        conn: &mut SqliteConnection,
        actor_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            "{} WHERE a.changed_by = ? ORDER BY a.changed_at DESC, a.id DESC",
            SELECT_AUDIT_LOG
        ))
        .bind(actor_id)
        .fetch_all(conn)
        .await
    }

    pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(conn)
            .await
    }

    pub async fn count_by_entity(
        conn: &mut SqliteConnection,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE entity_type = ? AND entity_id = ?")
            .bind(entity_type)
            .bind(entity_id)
            .fetch_one(conn)
            .await
    }
}
