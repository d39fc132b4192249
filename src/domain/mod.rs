//! Domain layer - Core types with no infrastructure dependencies
//!
//! This layer contains:
//! - Entities: IRC lines, typed events, commands
//! - Traits: Abstractions for infrastructure (Transport)

pub mod entities;
pub mod traits;
