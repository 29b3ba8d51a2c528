/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: Argon2id credential hashing behind the `CredentialHasher` trait
/// - [`jwt`]: JWT token generation and validation
/// - [`context`]: the resolved caller identity handed to route handlers
///
/// # Example
///
/// ```no_run
/// use taskledger_shared::auth::password::{hash_password, verify_password};
/// use taskledger_shared::auth::jwt::{create_token, Claims, TokenType};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new("alice", vec!["ROLE_USER".to_string()], TokenType::Access);
/// let token = create_token(&claims, "secret-key-at-least-32-bytes-long!")?;
/// # Ok(())
/// # }
/// ```

pub mod context;
pub mod jwt;
pub mod password;
