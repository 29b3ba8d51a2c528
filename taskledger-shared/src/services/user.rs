/// User mutation service
///
/// Registration, partial updates, lifecycle transitions and deletion of user
/// accounts. Every write is paired with one audit entry in the same
/// transaction, attributed to the system principal ([`SYSTEM_USERNAME`])
/// rather than to the administrator who made the call.
///
/// The system principal is an ordinary user row created by
/// [`UserService::ensure_system_principal`], which must run once at startup
/// before any other user mutation.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskledger_shared::auth::password::Argon2Hasher;
/// use taskledger_shared::services::user::{RegisterUser, UserService};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let users = UserService::new(pool, Arc::new(Argon2Hasher::default()));
/// users.ensure_system_principal().await?;
///
/// let alice = users.register(RegisterUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password: "correct horse".to_string(),
///     roles: None,
/// }).await?;
/// assert_eq!(alice.roles, vec!["ROLE_USER"]);
/// # Ok(())
/// # }
/// ```

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::audit::recorder::{self, AuditEvent};
use crate::db::pool::begin_write;
use crate::auth::password::CredentialHasher;
use crate::error::{FieldViolation, ServiceError, ServiceResult};
use crate::models::audit_log::AuditAction;
use crate::models::role::{Role, RoleName};
use crate::models::user::{CreateUser, User, UserView};

/// Username of the system principal
pub const SYSTEM_USERNAME: &str = "system";

/// Email of the system principal
pub const SYSTEM_EMAIL: &str = "system@taskledger.local";

const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 40;

/// Registration payload
#[derive(Clone, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(length(min = 3, max = 20, message = "Username must be 3 to 20 characters"))]
    pub username: String,

    #[validate(
        email(message = "Invalid email format"),
        length(max = 50, message = "Email must be at most 50 characters")
    )]
    pub email: String,

    #[validate(length(min = 6, max = 40, message = "Password must be 6 to 40 characters"))]
    pub password: String,

    /// Requested role names (`user`, `admin`); absent or empty means `user`
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl fmt::Debug for RegisterUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Partial update payload
///
/// Absent fields are left unchanged. An empty password and an empty role
/// list are treated as absent.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 3, max = 20, message = "Username must be 3 to 20 characters"))]
    pub username: Option<String>,

    #[validate(
        email(message = "Invalid email format"),
        length(max = 50, message = "Email must be at most 50 characters")
    )]
    pub email: Option<String>,

    pub password: Option<String>,

    pub roles: Option<Vec<String>>,
}

impl fmt::Debug for UpdateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("roles", &self.roles)
            .finish()
    }
}

impl UpdateUser {
    fn check(&self) -> ServiceResult<()> {
        let mut violations = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => FieldViolation::from_errors(&errors),
        };

        if let Some(password) = self.new_password() {
            let len = password.chars().count();
            if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
                violations.push(FieldViolation::new(
                    "password",
                    "Password must be 6 to 40 characters",
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            violations.sort_by(|a, b| a.field.cmp(&b.field));
            Err(ServiceError::Validation(violations))
        }
    }

    fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Result of a successful credential check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authenticated {
    pub username: String,
    pub roles: Vec<String>,
}

fn resolve_roles(requested: &[String]) -> ServiceResult<BTreeSet<RoleName>> {
    RoleName::resolve_all(requested)
        .map_err(|name| ServiceError::invalid("roles", format!("Unknown role: {}", name)))
}

async fn load_roles(
    conn: &mut SqliteConnection,
    names: &BTreeSet<RoleName>,
) -> ServiceResult<Vec<Role>> {
    let mut roles = Vec::with_capacity(names.len());
    for name in names {
        let role = Role::find_by_name(&mut *conn, *name)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Role {} not found", name)))?;
        roles.push(role);
    }
    Ok(roles)
}

/// User operations over a connection pool
#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
    hasher: Arc<dyn CredentialHasher>,
}

impl fmt::Debug for UserService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserService").field("pool", &self.pool).finish()
    }
}

impl UserService {
    pub fn new(pool: SqlitePool, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { pool, hasher }
    }

    async fn load(conn: &mut SqliteConnection, user_id: Uuid) -> ServiceResult<User> {
        match User::find_by_id(conn, user_id).await? {
            Some(user) => Ok(user),
            None => {
                warn!(%user_id, "User not found");
                Err(ServiceError::not_found(format!("User {} not found", user_id)))
            }
        }
    }

    /// Like [`Self::load`], but refuses the system principal
    ///
    /// Every user audit entry is attributed to that account, so it must keep
    /// its name, roles and active flag.
    async fn load_mutable(conn: &mut SqliteConnection, user_id: Uuid) -> ServiceResult<User> {
        let user = Self::load(conn, user_id).await?;
        if user.username == SYSTEM_USERNAME {
            warn!(%user_id, "Mutation of the system principal rejected");
            return Err(ServiceError::conflict("The system principal cannot be modified"));
        }
        Ok(user)
    }

    /// Inserts a user with its roles and records the CREATE entry
    async fn insert(
        conn: &mut SqliteConnection,
        data: CreateUser,
        roles: &BTreeSet<RoleName>,
    ) -> ServiceResult<User> {
        let role_rows = load_roles(&mut *conn, roles).await?;

        let user = User::create(&mut *conn, data).await?;
        Role::replace_for_user(&mut *conn, user.id, &role_rows).await?;

        recorder::record(
            &mut *conn,
            AuditEvent::created(&user.snapshot(roles))?,
            SYSTEM_USERNAME,
        )
        .await?;

        Ok(user)
    }

    /// Creates the system principal if it does not exist yet
    ///
    /// The principal holds `ROLE_ADMIN` and a random password nobody knows;
    /// its own CREATE entry is attributed to itself. Idempotent.
    pub async fn ensure_system_principal(&self) -> ServiceResult<UserView> {
        let mut tx = begin_write(&self.pool).await?;

        if let Some(existing) = User::find_by_username(&mut tx, SYSTEM_USERNAME).await? {
            let roles = Role::names_for_user(&mut tx, existing.id).await?;
            debug!(user_id = %existing.id, "System principal present");
            return Ok(existing.view(&roles));
        }

        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();
        let password_hash = self.hasher.hash(&secret)?;

        let roles = BTreeSet::from([RoleName::Admin]);
        let user = Self::insert(
            &mut tx,
            CreateUser {
                username: SYSTEM_USERNAME.to_string(),
                email: SYSTEM_EMAIL.to_string(),
                password_hash,
            },
            &roles,
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, "System principal created");
        Ok(user.view(&roles))
    }

    /// Registers a new user
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input or an unknown role name
    /// - `Conflict` if the username or email is taken
    pub async fn register(&self, request: RegisterUser) -> ServiceResult<UserView> {
        request.validate().map_err(ServiceError::from_validation)?;

        let roles = match request.roles.as_deref() {
            Some(requested) if !requested.is_empty() => resolve_roles(requested)?,
            _ => BTreeSet::from([RoleName::User]),
        };

        // Hash before taking the write lock
        let password_hash = self.hasher.hash(&request.password)?;

        let mut tx = begin_write(&self.pool).await?;

        // Fast path only; the unique indexes are authoritative
        if User::exists_by_username(&mut tx, &request.username).await? {
            warn!(username = %request.username, "Registration rejected: username taken");
            return Err(ServiceError::conflict("Username is already taken"));
        }
        if User::exists_by_email(&mut tx, &request.email).await? {
            warn!(email = %request.email, "Registration rejected: email in use");
            return Err(ServiceError::conflict("Email is already in use"));
        }

        let user = Self::insert(
            &mut tx,
            CreateUser {
                username: request.username,
                email: request.email,
                password_hash,
            },
            &roles,
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user.view(&roles))
    }

    /// Applies the fields present in `request`
    ///
    /// A field only counts as changed if it differs from the stored value;
    /// for the password that means it no longer verifies against the stored
    /// hash. If nothing changed, nothing is written or audited and the current
    /// view is returned.
    pub async fn update(&self, user_id: Uuid, request: UpdateUser) -> ServiceResult<UserView> {
        request.check()?;

        let requested_roles = match request.roles.as_deref() {
            Some(requested) if !requested.is_empty() => Some(resolve_roles(requested)?),
            _ => None,
        };

        let mut tx = begin_write(&self.pool).await?;

        let current = Self::load_mutable(&mut tx, user_id).await?;
        let current_roles = Role::names_for_user(&mut tx, user_id).await?;

        let mut updated = current.clone();
        let mut changed = false;

        if let Some(username) = request.username.as_deref() {
            if username != current.username {
                if User::exists_by_username(&mut tx, username).await? {
                    warn!(%user_id, %username, "Update rejected: username taken");
                    return Err(ServiceError::conflict("Username is already taken"));
                }
                updated.username = username.to_string();
                changed = true;
            }
        }

        if let Some(email) = request.email.as_deref() {
            if email != current.email {
                if User::exists_by_email(&mut tx, email).await? {
                    warn!(%user_id, %email, "Update rejected: email in use");
                    return Err(ServiceError::conflict("Email is already in use"));
                }
                updated.email = email.to_string();
                changed = true;
            }
        }

        if let Some(password) = request.new_password() {
            if !self.hasher.verify(password, &current.password_hash)? {
                updated.password_hash = self.hasher.hash(password)?;
                changed = true;
            }
        }

        let new_roles = requested_roles.filter(|roles| *roles != current_roles);
        changed |= new_roles.is_some();

        if !changed {
            debug!(%user_id, "Update had no effective changes");
            return Ok(current.view(&current_roles));
        }

        let before = current.snapshot(&current_roles);

        let saved = User::save(&mut tx, &updated).await?;
        let roles = match new_roles {
            Some(roles) => {
                let role_rows = load_roles(&mut tx, &roles).await?;
                Role::replace_for_user(&mut tx, user_id, &role_rows).await?;
                roles
            }
            None => current_roles,
        };

        recorder::record(
            &mut tx,
            AuditEvent::updated(&before, &saved.snapshot(&roles))?,
            SYSTEM_USERNAME,
        )
        .await?;

        tx.commit().await?;

        info!(%user_id, "User updated");
        Ok(saved.view(&roles))
    }

    /// Records a DELETE entry, then deletes the user
    ///
    /// # Errors
    ///
    /// `Conflict` if the user still owns tasks or is the actor of audit
    /// entries; audit history must stay resolvable, so such users can only be
    /// deactivated. The system principal is always refused.
    pub async fn delete(&self, user_id: Uuid) -> ServiceResult<()> {
        let mut tx = begin_write(&self.pool).await?;

        let user = Self::load_mutable(&mut tx, user_id).await?;
        let roles = Role::names_for_user(&mut tx, user_id).await?;

        recorder::record(
            &mut tx,
            AuditEvent::deleted(&user.snapshot(&roles))?,
            SYSTEM_USERNAME,
        )
        .await?;

        if !User::delete(&mut tx, user_id).await? {
            return Err(ServiceError::not_found(format!("User {} not found", user_id)));
        }

        tx.commit().await?;

        info!(%user_id, username = %user.username, "User deleted");
        Ok(())
    }

    async fn set_active(&self, user_id: Uuid, active: bool) -> ServiceResult<UserView> {
        let action = if active {
            AuditAction::Activate
        } else {
            AuditAction::Deactivate
        };

        let mut tx = begin_write(&self.pool).await?;

        let current = Self::load_mutable(&mut tx, user_id).await?;
        let roles = Role::names_for_user(&mut tx, user_id).await?;
        let before = current.snapshot(&roles);

        let mut updated = current;
        updated.active = active;
        let saved = User::save(&mut tx, &updated).await?;

        recorder::record(
            &mut tx,
            AuditEvent::transitioned(action, &before, &saved.snapshot(&roles))?,
            SYSTEM_USERNAME,
        )
        .await?;

        tx.commit().await?;

        info!(%user_id, %action, "User active flag changed");
        Ok(saved.view(&roles))
    }

    /// Sets `active = true` and records an ACTIVATE entry
    pub async fn activate(&self, user_id: Uuid) -> ServiceResult<UserView> {
        self.set_active(user_id, true).await
    }

    /// Sets `active = false` and records a DEACTIVATE entry
    pub async fn deactivate(&self, user_id: Uuid) -> ServiceResult<UserView> {
        self.set_active(user_id, false).await
    }

    /// All users ordered by username
    pub async fn get_all(&self) -> ServiceResult<Vec<UserView>> {
        let mut conn = self.pool.acquire().await?;
        let users = User::list_all(&mut conn).await?;

        let mut views = Vec::with_capacity(users.len());
        for user in &users {
            let roles = Role::names_for_user(&mut conn, user.id).await?;
            views.push(user.view(&roles));
        }

        debug!(count = views.len(), "Listed users");
        Ok(views)
    }

    pub async fn find_by_username(&self, username: &str) -> ServiceResult<Option<UserView>> {
        let mut conn = self.pool.acquire().await?;
        match User::find_by_username(&mut conn, username).await? {
            Some(user) => {
                let roles = Role::names_for_user(&mut conn, user.id).await?;
                Ok(Some(user.view(&roles)))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> ServiceResult<Option<UserView>> {
        let mut conn = self.pool.acquire().await?;
        match User::find_by_email(&mut conn, email).await? {
            Some(user) => {
                let roles = Role::names_for_user(&mut conn, user.id).await?;
                Ok(Some(user.view(&roles)))
            }
            None => Ok(None),
        }
    }

    pub async fn exists_by_username(&self, username: &str) -> ServiceResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(User::exists_by_username(&mut conn, username).await?)
    }

    pub async fn exists_by_email(&self, email: &str) -> ServiceResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(User::exists_by_email(&mut conn, email).await?)
    }

    /// Checks a username/password pair
    ///
    /// Returns `None` for an unknown user, an inactive user or a wrong
    /// password; the three are not distinguished.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> ServiceResult<Option<Authenticated>> {
        let mut conn = self.pool.acquire().await?;

        let user = match User::find_by_username(&mut conn, username).await? {
            Some(user) if user.active => user,
            _ => return Ok(None),
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            return Ok(None);
        }

        let roles = Role::names_for_user(&mut conn, user.id).await?;
        Ok(Some(Authenticated {
            username: user.username,
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
        }))
    }
}
