//! Inventory boundary consumed by purchasing: the append-only stock ledger.
//!
//! The ledger's storage engine is owned by the inventory subsystem; this crate
//! only fixes the contract (entries, idempotent append, projection reads) and
//! the pure rules every implementation applies.

pub mod ledger;

pub use ledger::{AppendOutcome, LedgerError, StockAppend, StockLedger, StockLedgerEntry};
