//! Business logic behind the HTTP handlers.

pub mod judge;
pub mod pipeline;
