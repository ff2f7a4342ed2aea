use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use procura_core::{
    Aggregate, AggregateRoot, ExpectedVersion, Money, OrderId, ProductId, PurchaseItemId,
    SupplierId, UserId,
};
use procura_events::{EventBus, EventEnvelope};
use procura_inventory::StockLedger;
use procura_purchasing::{
    DraftItem, DraftPurchaseOrder, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
};

use super::{EngineError, OrderView, ProcurementEngine};
use crate::gateway::PaymentGateway;
use crate::repository::{OrderRepository, StatusWrite};

/// Input for `create_order`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    pub created_by: UserId,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewPurchaseItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPurchaseItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl NewPurchaseItem {
    fn into_draft(self) -> DraftItem {
        DraftItem {
            item_id: PurchaseItemId::new(),
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Run `command` against a copy of `order`, returning the evolved copy and
/// the events that produced it. The input is never touched.
pub(super) fn decide(
    order: &PurchaseOrder,
    command: &PurchaseOrderCommand,
) -> Result<(PurchaseOrder, Vec<PurchaseOrderEvent>), EngineError> {
    let events = order.handle(command)?;
    let mut next = order.clone();
    for event in &events {
        next.apply(event);
    }
    Ok((next, events))
}

impl<R, G, L, B> ProcurementEngine<R, G, L, B>
where
    R: OrderRepository,
    G: PaymentGateway,
    L: StockLedger,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Draft a new order. The order starts in DRAFT at version 1.
    #[instrument(skip(self, input), fields(supplier_id = %input.supplier_id, items = input.items.len()), err)]
    pub fn create_order(&self, input: NewPurchaseOrder) -> Result<OrderView, EngineError> {
        let order_id = OrderId::new();
        let command = PurchaseOrderCommand::Draft(DraftPurchaseOrder {
            order_id,
            supplier_id: input.supplier_id,
            created_by: input.created_by,
            notes: input.notes,
            items: input.items.into_iter().map(NewPurchaseItem::into_draft).collect(),
            occurred_at: Utc::now(),
        });

        let empty = PurchaseOrder::empty(order_id);
        let (order, events) = decide(&empty, &command)?;
        self.repository.insert(&order)?;
        self.publish_all(order_id, empty.version(), &events);

        tracing::info!(order_id = %order_id, total = %order.total_amount(), "purchase order drafted");
        Ok(OrderView::from(&order))
    }

    /// Add a line to a DRAFT order.
    #[instrument(skip(self, item), fields(order_id = %order_id), err)]
    pub fn add_item(&self, order_id: OrderId, item: NewPurchaseItem) -> Result<OrderView, EngineError> {
        self.with_lock(order_id, || {
            let order = self.load_order(order_id)?;
            let command = PurchaseOrderCommand::AddItem {
                item: item.into_draft(),
                occurred_at: Utc::now(),
            };
            let (next, events) = decide(&order, &command)?;
            self.repository
                .save(&next, ExpectedVersion::Exact(order.version()))?;
            self.publish_all(order_id, order.version(), &events);

            tracing::info!(order_id = %order_id, total = %next.total_amount(), "item added");
            Ok(OrderView::from(&next))
        })
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<OrderView, EngineError> {
        self.load_order(order_id).map(|o| OrderView::from(&o))
    }

    /// DRAFT -> APPROVED. Items and total are frozen from here on.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub fn approve(&self, order_id: OrderId) -> Result<OrderView, EngineError> {
        self.with_lock(order_id, || {
            let order = self.load_order(order_id)?;
            let next = self.commit_transition(
                &order,
                PurchaseOrderCommand::Approve {
                    occurred_at: Utc::now(),
                },
            )?;
            Ok(OrderView::from(&next))
        })
    }

    /// RECEIVED -> CLOSED. No side effects beyond the transition.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub fn close(&self, order_id: OrderId) -> Result<OrderView, EngineError> {
        self.with_lock(order_id, || {
            let order = self.load_order(order_id)?;
            let next = self.commit_transition(
                &order,
                PurchaseOrderCommand::Close {
                    occurred_at: Utc::now(),
                },
            )?;
            Ok(OrderView::from(&next))
        })
    }

    /// DRAFT | APPROVED -> CANCELLED.
    ///
    /// Open payment intents are cancelled at the gateway first, best-effort:
    /// a gateway failure is logged and the order is cancelled regardless.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub fn cancel(&self, order_id: OrderId) -> Result<OrderView, EngineError> {
        self.with_lock(order_id, || {
            let order = self.load_order(order_id)?;
            let command = PurchaseOrderCommand::Cancel {
                occurred_at: Utc::now(),
            };
            // Reject illegal cancels before touching the gateway.
            decide(&order, &command)?;

            self.cancel_open_payments(&order)?;
            let next = self.commit_transition(&order, command)?;
            Ok(OrderView::from(&next))
        })
    }

    pub(super) fn load_order(&self, order_id: OrderId) -> Result<PurchaseOrder, EngineError> {
        self.repository
            .load(order_id)?
            .ok_or_else(|| EngineError::not_found(format!("purchase order {order_id}")))
    }

    /// Decide a status transition and commit it with compare-and-set on the
    /// status and version it was decided against. Caller holds the order lock.
    pub(super) fn commit_transition(
        &self,
        order: &PurchaseOrder,
        command: PurchaseOrderCommand,
    ) -> Result<PurchaseOrder, EngineError> {
        let (next, events) = decide(order, &command)?;
        self.repository
            .compare_and_set_status(StatusWrite::new(order.status(), order.version(), &next))?;
        self.publish_all(order.id_typed(), order.version(), &events);

        tracing::info!(
            order_id = %order.id_typed(),
            from = %order.status(),
            to = %next.status(),
            version = next.version(),
            "order transitioned"
        );
        Ok(next)
    }

    /// PAID -> RECEIVED once every line is complete. Caller holds the order lock.
    pub(super) fn mark_received(&self, order: &PurchaseOrder) -> Result<PurchaseOrder, EngineError> {
        self.commit_transition(
            order,
            PurchaseOrderCommand::MarkReceived {
                occurred_at: Utc::now(),
            },
        )
    }
}
