/// JWT token generation and validation
///
/// Tokens identify the acting user by username and carry the user's role
/// names, which is everything the core needs from the authentication edge:
/// task operations act on the subject's own tasks, user and audit operations
/// require `ROLE_ADMIN`.
///
/// # Token Types
///
/// - **Access**: 24 hours
/// - **Refresh**: 30 days, only exchangeable for a new access token
///
/// # Example
///
/// ```
/// use taskledger_shared::auth::jwt::{create_token, validate_token, Claims, TokenType};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let claims = Claims::new("alice", vec!["ROLE_USER".to_string()], TokenType::Access);
/// let token = create_token(&claims, "secret-key-at-least-32-bytes-long!")?;
///
/// let validated = validate_token(&token, "secret-key-at-least-32-bytes-long!")?;
/// assert_eq!(validated.sub, "alice");
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const ISSUER: &str = "taskledger";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Wrong token type for the operation
    #[error("Expected {expected} token, got {actual}")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Token issuer mismatch
    #[error("Invalid issuer")]
    InvalidIssuer,
}

/// Token type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the username of the acting user
    pub sub: String,

    /// Role names held when the token was issued (e.g. "ROLE_ADMIN")
    pub roles: Vec<String>,

    /// Issuer (always "taskledger")
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    pub token_type: TokenType,
}

impl Claims {
    /// Creates claims with the default expiration for the token type
    pub fn new(username: impl Into<String>, roles: Vec<String>, token_type: TokenType) -> Self {
        Self::with_expiration(username, roles, token_type, token_type.default_expiration())
    }

    pub fn with_expiration(
        username: impl Into<String>,
        roles: Vec<String>,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: username.into(),
            roles,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates signature, issuer, expiration and not-before
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

fn expect_type(claims: Claims, expected: TokenType) -> Result<Claims, JwtError> {
    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        });
    }
    Ok(claims)
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    expect_type(validate_token(token, secret)?, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    expect_type(validate_token(token, secret)?, TokenType::Refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn roles() -> Vec<String> {
        vec!["ROLE_USER".to_string()]
    }

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_create_and_validate_token() {
        let claims = Claims::new("alice", roles(), TokenType::Access);
        let token = create_token(&claims, SECRET).expect("Should create token");

        let validated = validate_token(&token, SECRET).expect("Should validate token");
        assert_eq!(validated.sub, "alice");
        assert_eq!(validated.roles, roles());
        assert_eq!(validated.iss, "taskledger");
        assert!(!validated.is_expired());
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let token = create_token(&Claims::new("alice", roles(), TokenType::Access), "secret1")
            .expect("Should create token");
        assert!(validate_token(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_expired_token() {
        let claims =
            Claims::with_expiration("alice", roles(), TokenType::Access, Duration::hours(-2));
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_token_type_enforced() {
        let refresh = create_token(&Claims::new("alice", roles(), TokenType::Refresh), SECRET)
            .unwrap();
        assert!(matches!(
            validate_access_token(&refresh, SECRET),
            Err(JwtError::WrongTokenType { expected: "access", .. })
        ));

        let claims = validate_refresh_token(&refresh, SECRET).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.roles, roles());
    }

    #[test]
    fn test_access_token_cannot_refresh() {
        let access = create_token(&Claims::new("alice", roles(), TokenType::Access), SECRET)
            .unwrap();
        assert!(matches!(
            validate_refresh_token(&access, SECRET),
            Err(JwtError::WrongTokenType { expected: "refresh", .. })
        ));
    }
}
