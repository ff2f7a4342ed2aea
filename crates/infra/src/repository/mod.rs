//! Order repository boundary.
//!
//! Durable store of purchase orders (with their items) and payment rows,
//! keyed by order id, with optimistic version checks on every write.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryOrderRepository;
pub use r#trait::{OrderRepository, RepositoryError, StatusWrite};
