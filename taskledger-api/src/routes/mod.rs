/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Login and token refresh
/// - `tasks`: The caller's own tasks
/// - `users`: User administration (admin)
/// - `audit_logs`: Audit history queries (admin)

pub mod audit_logs;
pub mod auth;
pub mod health;
pub mod tasks;
pub mod users;
