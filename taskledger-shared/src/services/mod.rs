/// Mutation services
///
/// - `task`: per-owner task operations (full-overwrite updates)
/// - `user`: account operations (partial updates, lifecycle transitions)
///
/// Both pair every entity write with its audit entry in one transaction.

pub mod task;
pub mod user;
