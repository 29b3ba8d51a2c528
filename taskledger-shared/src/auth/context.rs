/// Resolved caller identity
///
/// The API edge validates an access token, reloads the user it names and
/// hands the resulting `AuthContext` to route handlers. The core only ever sees `username`; role checks
/// happen before a service is called.

use serde::{Deserialize, Serialize};

use crate::models::role::RoleName;
use crate::models::user::UserView;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Username of the acting user
    pub username: String,

    /// Role names held by the caller
    pub roles: Vec<String>,
}

impl From<UserView> for AuthContext {
    fn from(user: UserView) -> Self {
        Self::new(user.username, user.roles)
    }
}

impl AuthContext {
    pub fn new(username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(RoleName::Admin)
    }
}
