/// Error taxonomy for the Taskledger core
///
/// Every service operation returns `ServiceResult<T>`. The variants mirror the
/// failure modes callers must distinguish:
///
/// - `Validation`: malformed input, detected before any write
/// - `NotFound`: missing entity, user, role or actor, and ownership mismatches
///   (which are deliberately indistinguishable from absence)
/// - `Conflict`: uniqueness or referential invariant breach
/// - `Transaction`: the entity write and its audit write failed to commit
///   together; nothing was applied
///
/// Errors are never retried inside the core.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::password::PasswordError;

/// Result alias used by the services
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field that failed validation
    pub field: String,

    /// Human-readable reason
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Flattens `validator` field errors, sorted by field name
    pub fn from_errors(errors: &validator::ValidationErrors) -> Vec<FieldViolation> {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    FieldViolation::new(
                        field.to_string(),
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "Validation failed".to_string()),
                    )
                })
            })
            .collect();

        // field_errors() is backed by a HashMap
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        violations
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Core service error
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("Credential hashing failed: {0}")]
    Credential(#[from] PasswordError),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Converts `validator` derive output into field violations
    pub fn from_validation(errors: validator::ValidationErrors) -> Self {
        Self::Validation(FieldViolation::from_errors(&errors))
    }
}

/// Maps storage failures onto the core taxonomy
///
/// Unique-index and foreign-key violations surface as `Conflict` because the
/// storage layer is the authoritative guard for both invariants.
impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::not_found("Resource not found"),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                let message = db_err.message();
                if message.contains("users.username") {
                    ServiceError::conflict("Username is already taken")
                } else if message.contains("users.email") {
                    ServiceError::conflict("Email is already in use")
                } else {
                    ServiceError::conflict(format!("Uniqueness violation: {}", message))
                }
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                ServiceError::conflict("Record is still referenced by other records")
            }
            other => ServiceError::Transaction(other),
        }
    }
}
