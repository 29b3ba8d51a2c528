//! # Taskledger Shared Library
//!
//! Data layer and business logic behind the Taskledger API: every task and
//! user mutation is written together with its audit entry in one database
//! transaction.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and embedded migrations
//! - `models`: Row types and SQL
//! - `auth`: Credential hashing, tokens and caller identity
//! - `audit`: Audit store, recorder and history queries
//! - `services`: Task and user mutation services
//! - `export`: Task export rendering
//! - `error`: Service error taxonomy

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod services;

/// Current version of the Taskledger shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
