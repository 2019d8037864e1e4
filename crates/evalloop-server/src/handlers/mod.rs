//! HTTP route handlers.

pub mod artifacts;
pub mod judge;
pub mod pipelines;
pub mod project;
pub mod results;
pub mod runs;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
