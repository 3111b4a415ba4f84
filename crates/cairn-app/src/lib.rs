//! HTTP layer: salvo routing, per-method handlers and server state.

pub mod app;
pub mod error;
pub mod state;
