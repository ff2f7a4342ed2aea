use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::instrument;

use procura_core::{AggregateRoot, CausationId, ExpectedVersion, OrderId, PurchaseItemId};
use procura_events::{EventBus, EventEnvelope};
use procura_inventory::{StockAppend, StockLedger};
use procura_purchasing::{PurchaseOrderCommand, PurchaseOrderEvent, RecordReceipt};

use super::state_machine::decide;
use super::{EngineError, OrderView, ProcurementEngine, ReceiptOutcome};
use crate::gateway::PaymentGateway;
use crate::repository::OrderRepository;

impl<R, G, L, B> ProcurementEngine<R, G, L, B>
where
    R: OrderRepository,
    G: PaymentGateway,
    L: StockLedger,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Receive `quantity` units of one line of a PAID order.
    ///
    /// The receipt id is derived as `order_id:item_id:sequence` from the
    /// line's receipt count.
    #[instrument(skip(self), fields(order_id = %order_id, item_id = %item_id), err)]
    pub fn receive(
        &self,
        order_id: OrderId,
        item_id: PurchaseItemId,
        quantity: i64,
    ) -> Result<ReceiptOutcome, EngineError> {
        self.with_lock(order_id, || self.receive_locked(order_id, item_id, quantity, None))
    }

    /// Like `receive`, with a caller-supplied receipt id. Replaying the same id
    /// is a successful no-op.
    #[instrument(skip(self), fields(order_id = %order_id, item_id = %item_id, causation_id = %causation_id), err)]
    pub fn receive_with_causation(
        &self,
        order_id: OrderId,
        item_id: PurchaseItemId,
        quantity: i64,
        causation_id: CausationId,
    ) -> Result<ReceiptOutcome, EngineError> {
        self.with_lock(order_id, || {
            self.receive_locked(order_id, item_id, quantity, Some(causation_id))
        })
    }

    fn receive_locked(
        &self,
        order_id: OrderId,
        item_id: PurchaseItemId,
        quantity: i64,
        causation_id: Option<CausationId>,
    ) -> Result<ReceiptOutcome, EngineError> {
        let order = self.load_order(order_id)?;
        let causation_id = causation_id.unwrap_or_else(|| match order.item(item_id) {
            Some(item) => item.next_causation(order_id),
            None => CausationId::derived(order_id, item_id, 1),
        });

        let command = PurchaseOrderCommand::RecordReceipt(RecordReceipt {
            item_id,
            quantity,
            causation_id: causation_id.clone(),
            occurred_at: Utc::now(),
        });
        let (next, events) = decide(&order, &command)?;

        let Some(PurchaseOrderEvent::GoodsReceived(received)) = events.first() else {
            tracing::info!(causation_id = %causation_id, "duplicate receipt ignored");
            return Ok(ReceiptOutcome::Duplicate {
                order: OrderView::from(&order),
            });
        };

        // The ledger write cannot be rolled back, so it goes first; a retry
        // after a failed order write finds it as a duplicate and completes.
        let appended = self.ledger.append(StockAppend {
            product_id: received.product_id,
            delta: received.quantity,
            reason: format!("purchase order {order_id} receipt"),
            causation_id: causation_id.clone(),
        })?;
        if appended.is_duplicate() {
            tracing::warn!(
                causation_id = %causation_id,
                "stock ledger already had this receipt; completing the order write"
            );
        }

        self.repository
            .save(&next, ExpectedVersion::Exact(order.version()))?;
        self.publish_all(order_id, order.version(), &events);

        let entry = appended.entry().clone();
        tracing::info!(
            order_id = %order_id,
            item_id = %item_id,
            quantity,
            received_qty = received.received_qty,
            new_stock = entry.new_stock,
            "goods received"
        );

        let next = if next.all_items_received() {
            self.mark_received(&next)?
        } else {
            next
        };

        Ok(ReceiptOutcome::Applied {
            order: OrderView::from(&next),
            entry,
        })
    }
}
