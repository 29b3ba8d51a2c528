/// Task mutation service
///
/// Every operation acts on behalf of an owner, identified by username. A task
/// that exists but belongs to someone else is reported exactly like a task
/// that does not exist.
///
/// Each mutation runs in one transaction: the task write and its audit entry
/// commit together, and any error drops the transaction, rolling back both.
/// Task audit entries are attributed to the owner.
///
/// Updates are full overwrites: every mutable field is replaced from the
/// request, so an omitted description or category is cleared.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::audit::recorder::{self, AuditEvent};
use crate::db::pool::begin_write;
use crate::error::{FieldViolation, ServiceError, ServiceResult};
use crate::export::ExportFormat;
use crate::models::task::{Task, TaskFields, TaskSnapshot, TaskView};
use crate::models::user::User;

/// Create/update payload
///
/// Missing `name` or `status` deserialize as empty strings and are then
/// rejected as blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TaskRequest {
    #[serde(default)]
    #[validate(length(max = 50, message = "Name must be at most 50 characters"))]
    pub name: String,

    #[validate(length(max = 50, message = "Description must be at most 50 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 50, message = "Category must be at most 50 characters"))]
    pub category: Option<String>,

    #[validate(required(message = "Due date is required"))]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    #[validate(length(max = 20, message = "Status must be at most 20 characters"))]
    pub status: String,
}

impl TaskRequest {
    /// Checks every field and returns the task fields to write
    ///
    /// All violations are reported together, sorted by field.
    pub fn into_fields(self) -> ServiceResult<TaskFields> {
        let mut violations = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => FieldViolation::from_errors(&errors),
        };

        if self.name.trim().is_empty() {
            violations.push(FieldViolation::new("name", "Name must not be blank"));
        }
        if self.status.trim().is_empty() {
            violations.push(FieldViolation::new("status", "Status must not be blank"));
        }

        let due_date = match self.due_date {
            Some(due_date) if violations.is_empty() => due_date,
            _ => {
                violations.sort_by(|a, b| a.field.cmp(&b.field));
                return Err(ServiceError::Validation(violations));
            }
        };

        Ok(TaskFields {
            name: self.name,
            description: self.description,
            category: self.category,
            due_date,
            status: self.status,
        })
    }
}

/// First instant of `date` in `tz`, as UTC
///
/// Midnight can fall into a DST gap; the first valid instant of the day is
/// used then.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);

    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// The local day containing `now`, as a half-open UTC range
/// `[start of today, start of tomorrow)`
pub fn day_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);

    (start_of_day(&tz, today), start_of_day(&tz, tomorrow))
}

/// Task operations over a connection pool
#[derive(Debug, Clone)]
pub struct TaskService {
    pool: SqlitePool,
}

impl TaskService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn resolve_owner(conn: &mut SqliteConnection, owner: &str) -> ServiceResult<User> {
        User::find_by_username(conn, owner)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("User '{}' not found", owner)))
    }

    async fn load_owned(
        conn: &mut SqliteConnection,
        owner: &User,
        task_id: Uuid,
    ) -> ServiceResult<Task> {
        match Task::find_by_id_and_owner(conn, task_id, owner.id).await? {
            Some(task) => Ok(task),
            None => {
                warn!(%task_id, owner = %owner.username, "Task not found for owner");
                Err(ServiceError::not_found(format!("Task {} not found", task_id)))
            }
        }
    }

    /// Creates a task owned by `owner` and records a CREATE entry
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input (nothing is written)
    /// - `NotFound` if `owner` is not a user
    pub async fn create(&self, owner: &str, request: TaskRequest) -> ServiceResult<TaskView> {
        let fields = request.into_fields()?;

        let mut tx = begin_write(&self.pool).await?;
        let owner = Self::resolve_owner(&mut tx, owner).await?;

        let task = Task::create(&mut tx, owner.id, &fields).await?;
        recorder::record(
            &mut tx,
            AuditEvent::created(&TaskSnapshot::from(&task))?,
            &owner.username,
        )
        .await?;

        tx.commit().await?;

        info!(task_id = %task.id, owner = %owner.username, "Task created");
        Ok(task.into())
    }

    /// Returns one of the owner's tasks
    pub async fn find_by_id(&self, owner: &str, task_id: Uuid) -> ServiceResult<TaskView> {
        let mut conn = self.pool.acquire().await?;
        let owner = Self::resolve_owner(&mut conn, owner).await?;

        let task = Self::load_owned(&mut conn, &owner, task_id).await?;
        Ok(task.into())
    }

    /// All of the owner's tasks, soonest due first
    pub async fn find_all_by_owner(&self, owner: &str) -> ServiceResult<Vec<TaskView>> {
        let mut conn = self.pool.acquire().await?;
        let owner = Self::resolve_owner(&mut conn, owner).await?;

        let tasks = Task::list_by_owner(&mut conn, owner.id).await?;
        debug!(owner = %owner.username, count = tasks.len(), "Listed tasks");

        Ok(tasks.into_iter().map(TaskView::from).collect())
    }

    /// Overwrites every mutable field of an owned task and records an UPDATE
    /// entry carrying the before and after snapshots
    pub async fn update(
        &self,
        owner: &str,
        task_id: Uuid,
        request: TaskRequest,
    ) -> ServiceResult<TaskView> {
        let fields = request.into_fields()?;

        let mut tx = begin_write(&self.pool).await?;
        let owner = Self::resolve_owner(&mut tx, owner).await?;

        let existing = Self::load_owned(&mut tx, &owner, task_id).await?;
        let before = TaskSnapshot::from(&existing);

        let updated = Task::replace_fields(&mut tx, task_id, owner.id, &fields)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Task {} not found", task_id)))?;
        let after = TaskSnapshot::from(&updated);

        recorder::record(&mut tx, AuditEvent::updated(&before, &after)?, &owner.username)
            .await?;

        tx.commit().await?;

        info!(%task_id, owner = %owner.username, "Task updated");
        Ok(updated.into())
    }

    /// Records a DELETE entry for an owned task, then deletes it
    pub async fn delete(&self, owner: &str, task_id: Uuid) -> ServiceResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        let owner = Self::resolve_owner(&mut tx, owner).await?;

        let existing = Self::load_owned(&mut tx, &owner, task_id).await?;
        recorder::record(
            &mut tx,
            AuditEvent::deleted(&TaskSnapshot::from(&existing))?,
            &owner.username,
        )
        .await?;

        if !Task::delete(&mut tx, task_id, owner.id).await? {
            return Err(ServiceError::not_found(format!("Task {} not found", task_id)));
        }

        tx.commit().await?;

        info!(%task_id, owner = %owner.username, "Task deleted");
        Ok(())
    }

    /// The owner's tasks due during the current local day
    pub async fn find_due_today(&self, owner: &str) -> ServiceResult<Vec<TaskView>> {
        let (start, end) = day_bounds(&Local::now());

        let mut conn = self.pool.acquire().await?;
        let owner = Self::resolve_owner(&mut conn, owner).await?;

        let tasks = Task::list_due_between(&mut conn, owner.id, start, end).await?;
        debug!(owner = %owner.username, %start, %end, count = tasks.len(), "Listed tasks due today");

        Ok(tasks.into_iter().map(TaskView::from).collect())
    }

    /// The owner's tasks due after the current local day
    pub async fn find_upcoming(&self, owner: &str) -> ServiceResult<Vec<TaskView>> {
        let (_, end) = day_bounds(&Local::now());

        let mut conn = self.pool.acquire().await?;
        let owner = Self::resolve_owner(&mut conn, owner).await?;

        let tasks = Task::list_due_from(&mut conn, owner.id, end).await?;
        debug!(owner = %owner.username, from = %end, count = tasks.len(), "Listed upcoming tasks");

        Ok(tasks.into_iter().map(TaskView::from).collect())
    }

    /// Renders all of the owner's tasks in `format`
    ///
    /// Read-only; nothing is audited.
    pub async fn export(&self, owner: &str, format: ExportFormat) -> ServiceResult<Vec<u8>> {
        let tasks = self.find_all_by_owner(owner).await?;
        let bytes = format.exporter().render(&tasks)?;

        debug!(%owner, %format, rows = tasks.len(), bytes = bytes.len(), "Exported tasks");
        Ok(bytes)
    }
}
