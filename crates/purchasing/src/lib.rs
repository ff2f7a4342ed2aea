//! Purchasing domain module (purchase orders, payments, goods receipts).
//!
//! This crate contains business rules only, implemented as deterministic
//! domain logic (no IO, no HTTP, no storage, no gateway calls).

pub mod order;
pub mod payment;

pub use order::{
    DraftItem, DraftPurchaseOrder, GoodsReceived, OrderStatus, PurchaseItem, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderDrafted, PurchaseOrderEvent, PurchaseOrderItemAdded,
    PurchaseOrderPaid, PurchaseOrderTransitioned, RecordReceipt,
};
pub use payment::{
    GatewayStatus, Payment, PaymentEvent, PaymentInitiated, PaymentStatus, PaymentStatusChanged,
    StatusChange,
};
pub use procura_core::CausationId;
