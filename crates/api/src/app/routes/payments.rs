use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use procura_core::{OrderId, PaymentId};

use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:id/reconcile", post(reconcile_payment))
}

/// `POST /orders/:id/payments`: create or reuse the order's payment intent.
pub async fn initiate_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.initiate_payment(order_id)).await {
        Ok(outcome) if outcome.reused => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.list_payments(order_id)).await {
        Ok(payments) => Json(payments).into_response(),
        Err(resp) => resp,
    }
}

pub async fn reconcile_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReconcileRequest>,
) -> axum::response::Response {
    let payment_id = match dto::parse_id::<PaymentId>(&id, "payment id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .run(move |engine| engine.reconcile_payment(payment_id, body.status))
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(resp) => resp,
    }
}

/// Gateway callback. Unknown intents answer 404 so the gateway redelivers.
pub async fn gateway_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::GatewayWebhook>,
) -> axum::response::Response {
    let dto::GatewayWebhook { intent_id, status } = body;
    match services
        .run(move |engine| engine.reconcile_intent(&intent_id, status))
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(resp) => resp,
    }
}
