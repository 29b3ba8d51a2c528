/// Audit logging
///
/// - `store`: append-only persistence and history queries
/// - `recorder`: builds and writes one entry per mutation, inside the
///   mutating transaction
///
/// [`AuditService`] is the pool-level read path used by the API.

pub mod recorder;
pub mod store;

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::audit_log::{AuditLog, EntityType};

/// Read-only access to audit history
#[derive(Debug, Clone)]
pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// History of one entity, newest first
    pub async fn list_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> ServiceResult<Vec<AuditLog>> {
        let mut conn = self.pool.acquire().await?;
        let entries = store::list_by_entity(&mut conn, entity_type, entity_id).await?;

        debug!(%entity_type, %entity_id, count = entries.len(), "Listed audit entries by entity");
        Ok(entries)
    }

    /// Everything `username` did, newest first
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub async fn list_by_actor(&self, username: &str) -> ServiceResult<Vec<AuditLog>> {
        let mut conn = self.pool.acquire().await?;
        let entries = store::list_by_actor(&mut conn, username).await?;

        debug!(actor = %username, count = entries.len(), "Listed audit entries by actor");
        Ok(entries)
    }
}
