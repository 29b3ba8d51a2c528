/// Task model and database operations
///
/// A task belongs to exactly one user. Every query here is scoped by
/// `owner_id`, so a task owned by someone else is indistinguishable from a
/// task that does not exist.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id BLOB PRIMARY KEY NOT NULL,
///     owner_id BLOB NOT NULL REFERENCES users (id),
///     name TEXT NOT NULL CHECK (length(name) <= 50),
///     description TEXT CHECK (description IS NULL OR length(description) <= 50),
///     category TEXT CHECK (category IS NULL OR length(category) <= 50),
///     due_date TEXT NOT NULL,
///     status TEXT NOT NULL CHECK (length(status) <= 20),
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use chrono::{Duration, Utc};
/// use taskledger_shared::models::task::{Task, TaskFields};
/// use taskledger_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(owner_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::in_memory()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let task = Task::create(&mut conn, owner_id, &TaskFields {
///     name: "Report".to_string(),
///     description: None,
///     category: Some("work".to_string()),
///     due_date: Utc::now() + Duration::hours(3),
///     status: "OPEN".to_string(),
/// }).await?;
///
/// let mine = Task::list_by_owner(&mut conn, owner_id).await?;
/// assert_eq!(mine[0].id, task.id);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

/// Task row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID (UUID v4), immutable
    pub id: Uuid,

    /// Owning user
    pub owner_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub category: Option<String>,

    pub due_date: DateTime<Utc>,

    /// Free-form status label (e.g. "OPEN", "DONE")
    pub status: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// The mutable fields of a task, already validated
///
/// Used for both creation and full-overwrite updates: `None` in an optional
/// field clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: String,
}

/// Audit snapshot of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: String,
}

/// Read view of a task, returned by the task service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            description: task.description.clone(),
            category: task.category.clone(),
            due_date: task.due_date,
            status: task.status.clone(),
        }
    }
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            description: task.description,
            category: task.category,
            due_date: task.due_date,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl Task {
    /// Inserts a new task owned by `owner_id`
    pub async fn create(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        fields: &TaskFields,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();

        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, owner_id, name, description, category, due_date, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, owner_id, name, description, category, due_date, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(fields.due_date)
        .bind(&fields.status)
        .bind(now)
        .bind(now)
        .fetch_one(conn)
        .await
    }

    /// Finds a task by ID, only if owned by `owner_id`
    pub async fn find_by_id_and_owner(
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, name, description, category, due_date, status, created_at, updated_at
            FROM tasks
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
    }

    /// All tasks of an owner, soonest due first
    pub async fn list_by_owner(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, name, description, category, due_date, status, created_at, updated_at
            FROM tasks
            WHERE owner_id = ?
            ORDER BY due_date ASC, created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(conn)
        .await
    }

    /// Tasks of an owner due in `[start, end)`, soonest first
    pub async fn list_due_between(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, name, description, category, due_date, status, created_at, updated_at
            FROM tasks
            WHERE owner_id = ? AND due_date >= ? AND due_date < ?
            ORDER BY due_date ASC, created_at ASC
            "#,
        )
        .bind(owner_id)
        .bind(start)
        .bind(end)
        .fetch_all(conn)
        .await
    }

    /// Tasks of an owner due at or after `from`, soonest first
    pub async fn list_due_from(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, name, description, category, due_date, status, created_at, updated_at
            FROM tasks
            WHERE owner_id = ? AND due_date >= ?
            ORDER BY due_date ASC, created_at ASC
            "#,
        )
        .bind(owner_id)
        .bind(from)
        .fetch_all(conn)
        .await
    }

    /// Overwrites every mutable field of an owned task
    ///
    /// Returns `None` if the task does not exist or is owned by someone else.
    pub async fn replace_fields(
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
        fields: &TaskFields,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET name = ?, description = ?, category = ?, due_date = ?, status = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            RETURNING id, owner_id, name, description, category, due_date, status, created_at, updated_at
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(fields.due_date)
        .bind(&fields.status)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
    }

    /// Deletes an owned task
    ///
    /// Returns `false` if no row matched.
    pub async fn delete(
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_by_owner(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(conn)
            .await
    }
}
