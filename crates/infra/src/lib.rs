//! Infrastructure layer: collaborator boundaries, in-memory adapters, and the
//! procurement engine that orchestrates them.

pub mod config;
pub mod engine;
pub mod gateway;
pub mod locks;
pub mod repository;
pub mod stock_ledger;


pub use config::EngineConfig;
pub use engine::{
    EngineError, ItemView, NewPurchaseItem, NewPurchaseOrder, OrderView, PaymentOutcome,
    PaymentView, ProcurementEngine, ReceiptOutcome, ReconcileOutcome,
};
