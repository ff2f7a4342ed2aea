use std::str::FromStr;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;

use procura_core::{CausationId, Money, ProductId, SupplierId, UserId};
use procura_infra::{NewPurchaseItem, NewPurchaseOrder};
use procura_purchasing::GatewayStatus;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub supplier_id: String,
    pub created_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Decimal string (`"12.50"`) or JSON number.
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub quantity: i64,
    /// Client token for this physical receipt; retries with the same token are no-ops.
    #[serde(default)]
    pub receipt_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub status: GatewayStatus,
}

/// Gateway callback body.
#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    pub intent_id: String,
    pub status: GatewayStatus,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what}")))
}

impl OrderItemRequest {
    pub fn into_new_item(self) -> Result<NewPurchaseItem, axum::response::Response> {
        let unit_price = Money::new(self.unit_price).map_err(|e| {
            errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        })?;
        Ok(NewPurchaseItem {
            product_id: parse_id::<ProductId>(&self.product_id, "product_id")?,
            quantity: self.quantity,
            unit_price,
        })
    }
}

impl CreateOrderRequest {
    pub fn into_new_order(self) -> Result<NewPurchaseOrder, axum::response::Response> {
        let supplier_id = parse_id::<SupplierId>(&self.supplier_id, "supplier_id")?;
        let created_by = parse_id::<UserId>(&self.created_by, "created_by")?;
        let items = self
            .items
            .into_iter()
            .map(OrderItemRequest::into_new_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NewPurchaseOrder {
            supplier_id,
            created_by,
            notes: self.notes,
            items,
        })
    }
}

impl ReceiptRequest {
    pub fn causation_id(&self) -> Result<Option<CausationId>, axum::response::Response> {
        self.receipt_id
            .as_deref()
            .map(CausationId::new)
            .transpose()
            .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
    }
}
