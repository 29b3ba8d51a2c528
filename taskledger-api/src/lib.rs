//! # Taskledger API Server Library
//!
//! HTTP edge over the taskledger core: JWT authentication, role checks and
//! JSON mapping of the task, user and audit services.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
