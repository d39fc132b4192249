//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Database: Shared, reference-counted database handles
//! - Adapters: IRC connection and operator console

pub mod adapters;
pub mod config;
pub mod database;
