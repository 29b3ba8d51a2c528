/// Audit recorder
///
/// Turns a mutation into one audit entry. [`record`] must be called with the
/// same connection (transaction) that performed the entity write, so the two
/// commit or roll back together.
///
/// # Example
///
/// ```no_run
/// use taskledger_shared::audit::recorder::{record, AuditEvent};
/// use taskledger_shared::models::task::{Task, TaskFields, TaskSnapshot};
/// use sqlx::SqlitePool;
/// use uuid::Uuid;
///
/// # async fn example(pool: SqlitePool, owner: Uuid, fields: TaskFields) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = pool.begin().await?;
///
/// let task = Task::create(&mut tx, owner, &fields).await?;
/// record(&mut tx, AuditEvent::created(&TaskSnapshot::from(&task))?, "alice").await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::store;
use crate::error::{ServiceError, ServiceResult};
use crate::models::audit_log::{AuditAction, AuditLog, EntityType, NewAuditLog};
use crate::models::task::TaskSnapshot;
use crate::models::user::{User, UserSnapshot};

/// An entity snapshot that can be written into the audit log
pub trait Snapshot: Serialize {
    const ENTITY_TYPE: EntityType;

    fn entity_id(&self) -> Uuid;

    /// Deterministic JSON rendering
    fn render(&self) -> ServiceResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Snapshot for TaskSnapshot {
    const ENTITY_TYPE: EntityType = EntityType::Task;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl Snapshot for UserSnapshot {
    const ENTITY_TYPE: EntityType = EntityType::User;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

/// One mutation, ready to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditEvent {
    /// CREATE: no old value
    pub fn created<S: Snapshot>(after: &S) -> ServiceResult<Self> {
        Ok(Self {
            action: AuditAction::Create,
            entity_type: S::ENTITY_TYPE,
            entity_id: after.entity_id(),
            old_value: None,
            new_value: Some(after.render()?),
        })
    }

    pub fn updated<S: Snapshot>(before: &S, after: &S) -> ServiceResult<Self> {
        Self::transitioned(AuditAction::Update, before, after)
    }

    /// DELETE: no new value
    pub fn deleted<S: Snapshot>(before: &S) -> ServiceResult<Self> {
        Ok(Self {
            action: AuditAction::Delete,
            entity_type: S::ENTITY_TYPE,
            entity_id: before.entity_id(),
            old_value: Some(before.render()?),
            new_value: None,
        })
    }

    /// Any before/after transition (UPDATE, ACTIVATE, DEACTIVATE)
    pub fn transitioned<S: Snapshot>(
        action: AuditAction,
        before: &S,
        after: &S,
    ) -> ServiceResult<Self> {
        Ok(Self {
            action,
            entity_type: S::ENTITY_TYPE,
            entity_id: after.entity_id(),
            old_value: Some(before.render()?),
            new_value: Some(after.render()?),
        })
    }
}

/// Records `event` as performed by `actor_username`
///
/// # Errors
///
/// - `NotFound` if the actor does not resolve to a user
/// - `Transaction` if the append fails; the caller's transaction must then
///   be dropped so the entity write rolls back too
pub async fn record(
    conn: &mut SqliteConnection,
    event: AuditEvent,
    actor_username: &str,
) -> ServiceResult<AuditLog> {
    let actor = User::find_by_username(&mut *conn, actor_username)
        .await?
        .ok_or_else(|| {
            ServiceError::not_found(format!("Audit actor '{}' not found", actor_username))
        })?;

    let entry = store::append(
        conn,
        NewAuditLog {
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            old_value: event.old_value,
            new_value: event.new_value,
            changed_by: actor.id,
            changed_at: Utc::now(),
        },
    )
    .await?;

    debug!(
        audit_id = entry.id,
        action = %entry.action,
        entity_type = %entry.entity_type,
        entity_id = %entry.entity_id,
        actor = %actor_username,
        "Audit entry recorded"
    );

    Ok(entry)
}
