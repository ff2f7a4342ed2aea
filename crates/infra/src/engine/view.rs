//! Response payloads returned by engine operations.

use chrono::{DateTime, Utc};
use serde::Serialize;

use procura_core::{
    AggregateRoot, Money, OrderId, PaymentId, ProductId, PurchaseItemId, SupplierId, UserId,
};
use procura_inventory::StockLedgerEntry;
use procura_purchasing::{OrderStatus, Payment, PaymentStatus, PurchaseItem, PurchaseOrder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: PurchaseItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub received_qty: i64,
    pub outstanding: i64,
}

impl From<&PurchaseItem> for ItemView {
    fn from(item: &PurchaseItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            received_qty: item.received_qty,
            outstanding: item.outstanding(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub supplier_id: Option<SupplierId>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_with: Option<PaymentId>,
    pub fully_received: bool,
    pub version: u64,
    pub items: Vec<ItemView>,
}

impl From<&PurchaseOrder> for OrderView {
    fn from(order: &PurchaseOrder) -> Self {
        Self {
            id: order.id_typed(),
            supplier_id: order.supplier_id(),
            status: order.status(),
            total_amount: order.total_amount(),
            notes: order.notes().map(str::to_string),
            created_by: order.created_by(),
            created_at: order.created_at(),
            paid_with: order.paid_with(),
            fully_received: order.all_items_received(),
            version: order.version(),
            items: order.items().iter().map(ItemView::from).collect(),
        }
    }
}

/// Payment as handed to the payer's client (includes the client secret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub purchase_order_id: OrderId,
    pub attempt: u32,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub external_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            purchase_order_id: p.purchase_order_id,
            attempt: p.attempt,
            status: p.status,
            amount: p.amount,
            currency: p.currency.clone(),
            external_intent_id: p.external_intent_id.clone(),
            client_secret: p.client_secret.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Result of `initiate_payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub payment: PaymentView,
    /// An already-open intent was handed back instead of creating one.
    pub reused: bool,
}

/// Result of a reconcile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub payment: PaymentView,
    pub order: OrderView,
    /// False for repeated or stale reports.
    pub applied: bool,
}

/// Result of a goods receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Applied {
        order: OrderView,
        entry: StockLedgerEntry,
    },
    /// The receipt id was seen before; nothing changed.
    Duplicate { order: OrderView },
}

impl ReceiptOutcome {
    pub fn order(&self) -> &OrderView {
        match self {
            ReceiptOutcome::Applied { order, .. } | ReceiptOutcome::Duplicate { order } => order,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ReceiptOutcome::Duplicate { .. })
    }
}
