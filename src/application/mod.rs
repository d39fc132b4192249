//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Command handling
//! - Errors: Domain-specific errors
//! - Messaging: Line handlers, typed event dispatch, outbound text

pub mod errors;
pub mod messaging;
pub mod services;
