//! Shared foundation for the cairn server: configuration, constants,
//! the core error type and the request-scoped cancellation token.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
