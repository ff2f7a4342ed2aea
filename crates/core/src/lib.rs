//! `procura-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod causation;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use causation::CausationId;
pub use error::{DomainError, DomainResult};
pub use id::{OrderId, PaymentId, ProductId, PurchaseItemId, SupplierId, UserId};
pub use money::Money;
