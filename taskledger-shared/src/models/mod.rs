/// Database models for Taskledger
///
/// Row types and their SQL. Every function takes a `&mut SqliteConnection`
/// so callers decide whether it runs inside a transaction.
///
/// # Models
///
/// - `role`: Fixed role reference data and user-role membership
/// - `user`: User accounts
/// - `task`: Per-user tasks
/// - `audit_log`: Append-only mutation history
///
/// # Example
///
/// ```no_run
/// use taskledger_shared::models::user::User;
/// use taskledger_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::in_memory()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let users = User::list_all(&mut conn).await?;
/// # Ok(())
/// # }
/// ```

pub mod audit_log;
pub mod role;
pub mod task;
pub mod user;
