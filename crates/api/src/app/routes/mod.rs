use axum::{routing::post, Router};

pub mod orders;
pub mod payments;
pub mod system;

/// Router for every engine-backed endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .route("/webhooks/gateway", post(payments::gateway_webhook))
}
