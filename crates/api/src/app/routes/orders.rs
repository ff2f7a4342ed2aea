use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use procura_core::{OrderId, PurchaseItemId};

use crate::app::dto;
use crate::app::routes::payments;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/items", post(add_item))
        .route("/:id/approve", post(approve_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/close", post(close_order))
        .route(
            "/:id/payments",
            post(payments::initiate_payment).get(payments::list_payments),
        )
        .route("/:id/items/:item_id/receipts", post(receive_goods))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let input = match body.into_new_order() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.create_order(input)).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.get_order(order_id)).await {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderItemRequest>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item = match body.into_new_item() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.add_item(order_id, item)).await {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn approve_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.approve(order_id)).await {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.cancel(order_id)).await {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn close_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.close(order_id)).await {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn receive_goods(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item_id)): Path<(String, String)>,
    Json(body): Json<dto::ReceiptRequest>,
) -> axum::response::Response {
    let order_id = match dto::parse_id::<OrderId>(&id, "purchase order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id = match dto::parse_id::<PurchaseItemId>(&item_id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let causation_id = match body.causation_id() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let quantity = body.quantity;

    let result = services
        .run(move |engine| match causation_id {
            Some(token) => engine.receive_with_causation(order_id, item_id, quantity, token),
            None => engine.receive(order_id, item_id, quantity),
        })
        .await;

    match result {
        Ok(outcome) if outcome.is_duplicate() => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(resp) => resp,
    }
}
