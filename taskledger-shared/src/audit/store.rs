/// Audit store
///
/// Write-once, read-many access to `audit_logs`. There is deliberately no
/// update or delete here.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::audit_log::{AuditLog, EntityType, NewAuditLog};
use crate::models::user::User;

/// Persists one audit entry and returns the stored row
///
/// # Errors
///
/// - `NotFound` if `changed_by` does not reference an existing user
/// - `Transaction` on storage failure
pub async fn append(conn: &mut SqliteConnection, entry: NewAuditLog) -> ServiceResult<AuditLog> {
    if User::find_by_id(&mut *conn, entry.changed_by).await?.is_none() {
        return Err(ServiceError::not_found(format!(
            "Audit actor {} not found",
            entry.changed_by
        )));
    }

    let id = AuditLog::append(&mut *conn, entry).await?;

    AuditLog::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Audit entry {} not found", id)))
}

/// History of one entity, newest first
///
/// An entity with no history (or one that never existed) yields an empty list.
pub async fn list_by_entity(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: Uuid,
) -> ServiceResult<Vec<AuditLog>> {
    Ok(AuditLog::list_by_entity(conn, entity_type, entity_id).await?)
}

/// Entries attributed to `username`, newest first
///
/// # Errors
///
/// `NotFound` if no user has that username.
pub async fn list_by_actor(
    conn: &mut SqliteConnection,
    username: &str,
) -> ServiceResult<Vec<AuditLog>> {
    let actor = User::find_by_username(&mut *conn, username)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("User '{}' not found", username)))?;

    Ok(AuditLog::list_by_actor(conn, actor.id).await?)
}
