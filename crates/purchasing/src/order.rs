use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    Aggregate, AggregateRoot, CausationId, DomainError, Money, OrderId, PaymentId, ProductId,
    PurchaseItemId, SupplierId, UserId,
};
use procura_events::Event;

/// Purchase order status lifecycle.
///
/// ```text
/// DRAFT -> APPROVED -> PAID -> RECEIVED -> CLOSED
///   \________\___________________________ CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Approved,
    Paid,
    Received,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Draft,
        OrderStatus::Approved,
        OrderStatus::Paid,
        OrderStatus::Received,
        OrderStatus::Closed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Cancelled)
    }

    /// The only legal edges of the lifecycle.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Approved)
                | (Approved, Paid)
                | (Paid, Received)
                | (Received, Closed)
                | (Draft, Cancelled)
                | (Approved, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase order line.
///
/// `quantity`, `unit_price` and `total_price` are frozen once the order leaves
/// DRAFT. `received_qty` only grows, and never past `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: PurchaseItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub received_qty: i64,
    /// Number of receipt events applied to this line.
    pub receipt_count: u32,
}

impl PurchaseItem {
    fn from_draft(draft: &DraftItem) -> Result<Self, DomainError> {
        Ok(Self {
            id: draft.item_id,
            product_id: draft.product_id,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            total_price: draft.unit_price.times(draft.quantity)?,
            received_qty: 0,
            receipt_count: 0,
        })
    }

    pub fn outstanding(&self) -> i64 {
        self.quantity - self.received_qty
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_qty == self.quantity
    }

    /// Causation id the next receipt on this line gets when the caller does
    /// not supply one.
    pub fn next_causation(&self, order_id: OrderId) -> CausationId {
        CausationId::derived(order_id, self.id, self.receipt_count + 1)
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: OrderId,
    supplier_id: Option<SupplierId>,
    items: Vec<PurchaseItem>,
    total_amount: Money,
    status: OrderStatus,
    notes: Option<String>,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    paid_with: Option<PaymentId>,
    applied_receipts: BTreeSet<CausationId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-drafted aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            supplier_id: None,
            items: Vec::new(),
            total_amount: Money::ZERO,
            status: OrderStatus::Draft,
            notes: None,
            created_by: None,
            created_at: None,
            paid_with: None,
            applied_receipts: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn items(&self) -> &[PurchaseItem] {
        &self.items
    }

    pub fn item(&self, item_id: PurchaseItemId) -> Option<&PurchaseItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Payment that moved the order to PAID, if any.
    pub fn paid_with(&self) -> Option<PaymentId> {
        self.paid_with
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn has_applied(&self, causation_id: &CausationId) -> bool {
        self.applied_receipts.contains(causation_id)
    }

    pub fn all_items_received(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(PurchaseItem::is_fully_received)
    }

    /// Sum of the line totals; always equal to `total_amount()`.
    pub fn recomputed_total(&self) -> Result<Money, DomainError> {
        Money::total(self.items.iter().map(|i| i.total_price))
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// New line on a draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub item_id: PurchaseItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: DraftPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPurchaseOrder {
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub items: Vec<DraftItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReceipt (one item, one physical receipt event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub item_id: PurchaseItemId,
    pub quantity: i64,
    pub causation_id: CausationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    Draft(DraftPurchaseOrder),
    AddItem {
        item: DraftItem,
        occurred_at: DateTime<Utc>,
    },
    Approve {
        occurred_at: DateTime<Utc>,
    },
    Cancel {
        occurred_at: DateTime<Utc>,
    },
    MarkPaid {
        payment_id: PaymentId,
        occurred_at: DateTime<Utc>,
    },
    RecordReceipt(RecordReceipt),
    MarkReceived {
        occurred_at: DateTime<Utc>,
    },
    Close {
        occurred_at: DateTime<Utc>,
    },
}

/// Event: PurchaseOrderDrafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDrafted {
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub items: Vec<PurchaseItem>,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderItemAdded (DRAFT only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItemAdded {
    pub order_id: OrderId,
    pub item: PurchaseItem,
    /// Order total including the new line.
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event payload shared by the plain status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderTransitioned {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderPaid {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the product and quantity so the stock ledger write can be matched
/// to it through `causation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: OrderId,
    pub item_id: PurchaseItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Line total received after this event.
    pub received_qty: i64,
    pub causation_id: CausationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    Drafted(PurchaseOrderDrafted),
    ItemAdded(PurchaseOrderItemAdded),
    Approved(PurchaseOrderTransitioned),
    Cancelled(PurchaseOrderTransitioned),
    Paid(PurchaseOrderPaid),
    GoodsReceived(GoodsReceived),
    Received(PurchaseOrderTransitioned),
    Closed(PurchaseOrderTransitioned),
}

impl PurchaseOrderEvent {
    /// Status the order ends up in, for events that move it.
    pub fn target_status(&self) -> Option<OrderStatus> {
        match self {
            PurchaseOrderEvent::Approved(_) => Some(OrderStatus::Approved),
            PurchaseOrderEvent::Cancelled(_) => Some(OrderStatus::Cancelled),
            PurchaseOrderEvent::Paid(_) => Some(OrderStatus::Paid),
            PurchaseOrderEvent::Received(_) => Some(OrderStatus::Received),
            PurchaseOrderEvent::Closed(_) => Some(OrderStatus::Closed),
            PurchaseOrderEvent::Drafted(_)
            | PurchaseOrderEvent::ItemAdded(_)
            | PurchaseOrderEvent::GoodsReceived(_) => None,
        }
    }
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::Drafted(_) => "purchasing.order.drafted",
            PurchaseOrderEvent::ItemAdded(_) => "purchasing.order.item_added",
            PurchaseOrderEvent::Approved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::Cancelled(_) => "purchasing.order.cancelled",
            PurchaseOrderEvent::Paid(_) => "purchasing.order.paid",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::Received(_) => "purchasing.order.received",
            PurchaseOrderEvent::Closed(_) => "purchasing.order.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::Drafted(e) => e.occurred_at,
            PurchaseOrderEvent::ItemAdded(e) => e.occurred_at,
            PurchaseOrderEvent::Paid(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::Approved(e)
            | PurchaseOrderEvent::Cancelled(e)
            | PurchaseOrderEvent::Received(e)
            | PurchaseOrderEvent::Closed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::Drafted(e) => {
                self.id = e.order_id;
                self.supplier_id = Some(e.supplier_id);
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.notes = e.notes.clone();
                self.items = e.items.clone();
                self.total_amount = e.total_amount;
                self.status = OrderStatus::Draft;
                self.created = true;
            }
            PurchaseOrderEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
                self.total_amount = e.total_amount;
            }
            PurchaseOrderEvent::Paid(e) => {
                self.paid_with = Some(e.payment_id);
                self.status = OrderStatus::Paid;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.received_qty = e.received_qty;
                    item.receipt_count += 1;
                }
                self.applied_receipts.insert(e.causation_id.clone());
            }
            PurchaseOrderEvent::Approved(e)
            | PurchaseOrderEvent::Cancelled(e)
            | PurchaseOrderEvent::Received(e)
            | PurchaseOrderEvent::Closed(e) => {
                self.status = e.to;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::Draft(cmd) => self.handle_draft(cmd),
            PurchaseOrderCommand::AddItem { item, occurred_at } => {
                self.handle_add_item(item, *occurred_at)
            }
            PurchaseOrderCommand::Approve { occurred_at } => {
                if self.items.is_empty() {
                    return Err(DomainError::validation(
                        "cannot approve purchase order without items",
                    ));
                }
                let t = self.transition("approve", OrderStatus::Approved, *occurred_at)?;
                Ok(vec![PurchaseOrderEvent::Approved(t)])
            }
            PurchaseOrderCommand::Cancel { occurred_at } => {
                let t = self.transition("cancel", OrderStatus::Cancelled, *occurred_at)?;
                Ok(vec![PurchaseOrderEvent::Cancelled(t)])
            }
            PurchaseOrderCommand::MarkPaid {
                payment_id,
                occurred_at,
            } => {
                self.transition("mark paid", OrderStatus::Paid, *occurred_at)?;
                Ok(vec![PurchaseOrderEvent::Paid(PurchaseOrderPaid {
                    order_id: self.id,
                    payment_id: *payment_id,
                    occurred_at: *occurred_at,
                })])
            }
            PurchaseOrderCommand::RecordReceipt(cmd) => self.handle_receipt(cmd),
            PurchaseOrderCommand::MarkReceived { occurred_at } => {
                let t = self.transition("mark received", OrderStatus::Received, *occurred_at)?;
                if !self.all_items_received() {
                    return Err(DomainError::validation(
                        "cannot mark received while items are outstanding",
                    ));
                }
                Ok(vec![PurchaseOrderEvent::Received(t)])
            }
            PurchaseOrderCommand::Close { occurred_at } => {
                let t = self.transition("close", OrderStatus::Closed, *occurred_at)?;
                Ok(vec![PurchaseOrderEvent::Closed(t)])
            }
        }
    }
}

impl PurchaseOrder {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("purchase order {}", self.id)));
        }
        Ok(())
    }

    fn transition(
        &self,
        action: &'static str,
        to: OrderStatus,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrderTransitioned, DomainError> {
        self.ensure_created()?;
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invalid_transition(action, self.status));
        }
        Ok(PurchaseOrderTransitioned {
            order_id: self.id,
            from: self.status,
            to,
            occurred_at,
        })
    }

    fn validate_draft_item(&self, item: &DraftItem) -> Result<(), DomainError> {
        if item.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.items.iter().any(|i| i.id == item.item_id) {
            return Err(DomainError::conflict(format!(
                "item {} already exists on order",
                item.item_id
            )));
        }
        Ok(())
    }

    fn handle_draft(&self, cmd: &DraftPurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.order_id != self.id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation(
                "purchase order needs at least one item",
            ));
        }

        let mut items: Vec<PurchaseItem> = Vec::with_capacity(cmd.items.len());
        for draft in &cmd.items {
            if draft.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if items.iter().any(|i| i.id == draft.item_id) {
                return Err(DomainError::validation(format!(
                    "duplicate item id {}",
                    draft.item_id
                )));
            }
            items.push(PurchaseItem::from_draft(draft)?);
        }
        let total_amount = payable_total(items.iter().map(|i| i.total_price))?;

        Ok(vec![PurchaseOrderEvent::Drafted(PurchaseOrderDrafted {
            order_id: cmd.order_id,
            supplier_id: cmd.supplier_id,
            created_by: cmd.created_by,
            notes: cmd
                .notes
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            items,
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(
        &self,
        item: &DraftItem,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;
        if self.status != OrderStatus::Draft {
            return Err(DomainError::invalid_transition("add items to", self.status));
        }
        self.validate_draft_item(item)?;

        let item = PurchaseItem::from_draft(item)?;
        let total_amount = payable_total(
            self.items
                .iter()
                .chain(std::iter::once(&item))
                .map(|i| i.total_price),
        )?;

        Ok(vec![PurchaseOrderEvent::ItemAdded(PurchaseOrderItemAdded {
            order_id: self.id,
            item,
            total_amount,
            occurred_at,
        })])
    }

    fn handle_receipt(&self, cmd: &RecordReceipt) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;

        // A replayed receipt stays a no-op even after the order moved on to
        // RECEIVED because of it.
        if self.applied_receipts.contains(&cmd.causation_id) {
            return Ok(vec![]);
        }

        if self.status != OrderStatus::Paid {
            return Err(DomainError::invalid_transition("receive goods for", self.status));
        }

        let item = self
            .item(cmd.item_id)
            .ok_or_else(|| DomainError::not_found(format!("purchase item {}", cmd.item_id)))?;

        let after = item.received_qty.checked_add(cmd.quantity);
        let fits = matches!(after, Some(total) if total <= item.quantity);
        if cmd.quantity <= 0 || !fits {
            return Err(DomainError::OverReceipt {
                item_id: item.id.to_string(),
                ordered: item.quantity,
                received: item.received_qty,
                attempted: cmd.quantity,
            });
        }

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            order_id: self.id,
            item_id: item.id,
            product_id: item.product_id,
            quantity: cmd.quantity,
            received_qty: item.received_qty + cmd.quantity,
            causation_id: cmd.causation_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Sum line totals; the result must also be chargeable in gateway minor units.
fn payable_total(amounts: impl IntoIterator<Item = Money>) -> Result<Money, DomainError> {
    let total = Money::total(amounts)?;
    total.minor_units()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn money(amount: Decimal) -> Money {
        Money::new(amount).unwrap()
    }

    fn draft_item(quantity: i64, unit_price: Decimal) -> DraftItem {
        DraftItem {
            item_id: PurchaseItemId::new(),
            product_id: ProductId::new(),
            quantity,
            unit_price: money(unit_price),
        }
    }

    fn execute(order: &mut PurchaseOrder, cmd: PurchaseOrderCommand) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        let events = order.handle(&cmd)?;
        for e in &events {
            order.apply(e);
        }
        Ok(events)
    }

    fn drafted(items: Vec<DraftItem>) -> PurchaseOrder {
        let order_id = OrderId::new();
        let mut order = PurchaseOrder::empty(order_id);
        execute(
            &mut order,
            PurchaseOrderCommand::Draft(DraftPurchaseOrder {
                order_id,
                supplier_id: SupplierId::new(),
                created_by: UserId::new(),
                notes: Some("  rush  ".to_string()),
                items,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn paid(items: Vec<DraftItem>) -> PurchaseOrder {
        let mut order = drafted(items);
        execute(&mut order, PurchaseOrderCommand::Approve { occurred_at: test_time() }).unwrap();
        execute(
            &mut order,
            PurchaseOrderCommand::MarkPaid {
                payment_id: PaymentId::new(),
                occurred_at: test_time(),
            },
        )
        .unwrap();
        order
    }

    fn receipt(item_id: PurchaseItemId, quantity: i64, token: &str) -> PurchaseOrderCommand {
        PurchaseOrderCommand::RecordReceipt(RecordReceipt {
            item_id,
            quantity,
            causation_id: CausationId::new(token).unwrap(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn draft_computes_total_from_items() {
        let order = drafted(vec![draft_item(10, dec!(5)), draft_item(5, dec!(20))]);

        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(order.total_amount().amount(), dec!(150));
        assert_eq!(order.total_amount(), order.recomputed_total().unwrap());
        assert_eq!(order.notes(), Some("rush"));
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn draft_rejects_empty_and_non_positive_items() {
        let order_id = OrderId::new();
        let order = PurchaseOrder::empty(order_id);
        let base = DraftPurchaseOrder {
            order_id,
            supplier_id: SupplierId::new(),
            created_by: UserId::new(),
            notes: None,
            items: vec![],
            occurred_at: test_time(),
        };

        let err = order.handle(&PurchaseOrderCommand::Draft(base.clone())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut zero = base;
        zero.items = vec![draft_item(0, dec!(1))];
        let err = order.handle(&PurchaseOrderCommand::Draft(zero)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn oversized_totals_are_rejected_not_panicking() {
        let order_id = OrderId::new();
        let order = PurchaseOrder::empty(order_id);
        let cmd = |items| {
            PurchaseOrderCommand::Draft(DraftPurchaseOrder {
                order_id,
                supplier_id: SupplierId::new(),
                created_by: UserId::new(),
                notes: None,
                items,
                occurred_at: test_time(),
            })
        };

        // Line total overflows Decimal.
        let err = order
            .handle(&cmd(vec![draft_item(3, Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0))]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Representable, but not chargeable in minor units.
        let err = order
            .handle(&cmd(vec![draft_item(1, Decimal::from_i128_with_scale(10i128.pow(27), 0))]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Adding a line may not push the total past the limit either.
        let mut draft = drafted(vec![draft_item(1, dec!(10))]);
        let big = draft_item(1, Decimal::from_i128_with_scale(10i128.pow(17), 0));
        let err = execute(
            &mut draft,
            PurchaseOrderCommand::AddItem { item: big, occurred_at: test_time() },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(draft.total_amount().amount(), dec!(10));
        assert_eq!(draft.items().len(), 1);
    }

    #[test]
    fn items_are_frozen_after_approval() {
        let mut order = drafted(vec![draft_item(1, dec!(1))]);
        execute(
            &mut order,
            PurchaseOrderCommand::AddItem {
                item: draft_item(2, dec!(3)),
                occurred_at: test_time(),
            },
        )
        .unwrap();
        assert_eq!(order.total_amount().amount(), dec!(7));

        execute(&mut order, PurchaseOrderCommand::Approve { occurred_at: test_time() }).unwrap();
        let err = order
            .handle(&PurchaseOrderCommand::AddItem {
                item: draft_item(1, dec!(1)),
                occurred_at: test_time(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn close_on_draft_is_an_invalid_transition_and_changes_nothing() {
        let order = drafted(vec![draft_item(1, dec!(1))]);
        let before = order.clone();

        let err = order
            .handle(&PurchaseOrderCommand::Close { occurred_at: test_time() })
            .unwrap_err();

        match err {
            DomainError::InvalidTransition { action, status } => {
                assert_eq!(action, "close");
                assert_eq!(status, "DRAFT");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(order, before);
    }

    #[test]
    fn cancel_is_only_reachable_from_draft_or_approved() {
        let mut draft = drafted(vec![draft_item(1, dec!(1))]);
        execute(&mut draft, PurchaseOrderCommand::Cancel { occurred_at: test_time() }).unwrap();
        assert_eq!(draft.status(), OrderStatus::Cancelled);

        let order = paid(vec![draft_item(1, dec!(1))]);
        let err = order
            .handle(&PurchaseOrderCommand::Cancel { occurred_at: test_time() })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn receive_requires_paid() {
        let order = drafted(vec![draft_item(3, dec!(1))]);
        let item_id = order.items()[0].id;

        let err = order.handle(&receipt(item_id, 1, "r1")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn over_receipt_is_rejected_without_clamping() {
        let mut order = paid(vec![draft_item(10, dec!(5))]);
        let item_id = order.items()[0].id;

        execute(&mut order, receipt(item_id, 6, "r1")).unwrap();
        let err = order.handle(&receipt(item_id, 5, "r2")).unwrap_err();

        match err {
            DomainError::OverReceipt {
                ordered,
                received,
                attempted,
                ..
            } => {
                assert_eq!((ordered, received, attempted), (10, 6, 5));
            }
            other => panic!("expected OverReceipt, got {other:?}"),
        }
        assert_eq!(order.items()[0].received_qty, 6);

        let err = order.handle(&receipt(item_id, 0, "r3")).unwrap_err();
        assert!(matches!(err, DomainError::OverReceipt { .. }));
    }

    #[test]
    fn replayed_causation_is_a_no_op_even_after_received() {
        let mut order = paid(vec![draft_item(4, dec!(1))]);
        let item_id = order.items()[0].id;

        execute(&mut order, receipt(item_id, 4, "dock-1")).unwrap();
        execute(&mut order, PurchaseOrderCommand::MarkReceived { occurred_at: test_time() })
            .unwrap();
        let version = order.version();

        let events = execute(&mut order, receipt(item_id, 4, "dock-1")).unwrap();
        assert!(events.is_empty());
        assert_eq!(order.version(), version);
        assert_eq!(order.items()[0].received_qty, 4);
    }

    #[test]
    fn mark_received_requires_every_item_complete() {
        let mut order = paid(vec![draft_item(2, dec!(1)), draft_item(1, dec!(1))]);
        let first = order.items()[0].id;
        execute(&mut order, receipt(first, 2, "a")).unwrap();

        let err = order
            .handle(&PurchaseOrderCommand::MarkReceived { occurred_at: test_time() })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn derived_causation_advances_with_each_receipt() {
        let mut order = paid(vec![draft_item(5, dec!(1))]);
        let item = order.items()[0].clone();
        let first = item.next_causation(order.id_typed());

        execute(
            &mut order,
            PurchaseOrderCommand::RecordReceipt(RecordReceipt {
                item_id: item.id,
                quantity: 1,
                causation_id: first.clone(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let second = order.items()[0].next_causation(order.id_typed());
        assert_ne!(first, second);
        assert!(order.has_applied(&first));
    }

    #[test]
    fn only_lifecycle_edges_are_legal() {
        use OrderStatus::*;
        let legal = [
            (Draft, Approved),
            (Approved, Paid),
            (Paid, Received),
            (Received, Closed),
            (Draft, Cancelled),
            (Approved, Cancelled),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(from.can_transition_to(to), legal.contains(&(from, to)), "{from} -> {to}");
            }
        }
        assert!(Closed.is_terminal() && Cancelled.is_terminal());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Approve,
        Cancel,
        Pay,
        Receive { item: usize, qty: i64 },
        MarkReceived,
        Close,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Approve),
            Just(Step::Cancel),
            Just(Step::Pay),
            (0usize..3, -2i64..8).prop_map(|(item, qty)| Step::Receive { item, qty }),
            Just(Step::MarkReceived),
            Just(Step::Close),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of commands is thrown at an order, every
        /// accepted status change follows a lifecycle edge, rejected commands
        /// leave the order untouched, and no line is ever over-received.
        #[test]
        fn arbitrary_command_sequences_preserve_invariants(
            quantities in prop::collection::vec(1i64..6, 1..4),
            steps in prop::collection::vec(step(), 0..40)
        ) {
            let mut order = drafted(quantities.iter().map(|q| draft_item(*q, dec!(2))).collect());

            for (n, s) in steps.into_iter().enumerate() {
                let cmd = match s {
                    Step::Approve => PurchaseOrderCommand::Approve { occurred_at: test_time() },
                    Step::Cancel => PurchaseOrderCommand::Cancel { occurred_at: test_time() },
                    Step::Pay => PurchaseOrderCommand::MarkPaid { payment_id: PaymentId::new(), occurred_at: test_time() },
                    Step::Receive { item, qty } => {
                        let idx = item % order.items().len();
                        receipt(order.items()[idx].id, qty, &format!("r{n}"))
                    }
                    Step::MarkReceived => PurchaseOrderCommand::MarkReceived { occurred_at: test_time() },
                    Step::Close => PurchaseOrderCommand::Close { occurred_at: test_time() },
                };

                let before = order.clone();
                match order.handle(&cmd) {
                    Ok(events) => {
                        for e in &events {
                            if let Some(to) = e.target_status() {
                                prop_assert!(order.status().can_transition_to(to));
                            }
                            order.apply(e);
                        }
                    }
                    Err(_) => prop_assert_eq!(&order, &before),
                }

                for item in order.items() {
                    prop_assert!(item.received_qty >= 0 && item.received_qty <= item.quantity);
                }
                prop_assert_eq!(order.total_amount(), order.recomputed_total().unwrap());
            }
        }
    }
}
