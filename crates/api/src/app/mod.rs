//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: engine wiring and the blocking-call bridge
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and parsing into engine inputs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use procura_infra::EngineConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an in-memory engine (entrypoint used by `main.rs`).
pub fn build_app(config: EngineConfig) -> Router {
    router_with(Arc::new(services::AppServices::in_memory(config)))
}

/// Build the router around already-wired services.
pub fn router_with(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router().layer(Extension(services)))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests)))
}
