use std::sync::Arc;

use thiserror::Error;

use procura_core::{ExpectedVersion, OrderId, PaymentId};
use procura_purchasing::{OrderStatus, Payment, PurchaseOrder};

/// Repository operation error.
///
/// `Concurrency` is the only recoverable variant: the caller reloads and
/// retries. `Unavailable` covers storage faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// A status transition decided against a specific stored state.
///
/// `order` already carries the new status and version; the write only lands
/// if the stored order is still at `expected_status` / `expected_version`.
#[derive(Debug, Clone, Copy)]
pub struct StatusWrite<'a> {
    pub expected_status: OrderStatus,
    pub expected_version: u64,
    pub order: &'a PurchaseOrder,
}

impl<'a> StatusWrite<'a> {
    pub fn new(expected_status: OrderStatus, expected_version: u64, order: &'a PurchaseOrder) -> Self {
        Self {
            expected_status,
            expected_version,
            order,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order.id_typed()
    }

    pub fn new_status(&self) -> OrderStatus {
        self.order.status()
    }
}

/// Durable store for orders and their payments.
///
/// Implementations must:
/// - reject writes whose expected version/status no longer matches
/// - refuse a second active (PENDING/PROCESSING/SUCCEEDED) payment per order
/// - apply `update_payment` with a `StatusWrite` atomically (both or neither)
pub trait OrderRepository: Send + Sync {
    /// Store a newly drafted order.
    fn insert(&self, order: &PurchaseOrder) -> Result<(), RepositoryError>;

    fn load(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, RepositoryError>;

    /// Persist a non-status change (items added, receipts applied).
    fn save(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), RepositoryError>;

    /// Atomic `(order_id, expected_status) -> new_status` guarded by version.
    fn compare_and_set_status(&self, write: StatusWrite<'_>) -> Result<(), RepositoryError>;

    fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError>;

    /// Update a payment row, optionally committing an order transition with it.
    fn update_payment(
        &self,
        payment: &Payment,
        order: Option<StatusWrite<'_>>,
    ) -> Result<(), RepositoryError>;

    /// All payments of an order, oldest attempt first.
    fn list_payments(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError>;

    fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, RepositoryError>;

    fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, RepositoryError>;
}

impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository + ?Sized,
{
    fn insert(&self, order: &PurchaseOrder) -> Result<(), RepositoryError> {
        (**self).insert(order)
    }

    fn load(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, RepositoryError> {
        (**self).load(order_id)
    }

    fn save(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        (**self).save(order, expected)
    }

    fn compare_and_set_status(&self, write: StatusWrite<'_>) -> Result<(), RepositoryError> {
        (**self).compare_and_set_status(write)
    }

    fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        (**self).insert_payment(payment)
    }

    fn update_payment(
        &self,
        payment: &Payment,
        order: Option<StatusWrite<'_>>,
    ) -> Result<(), RepositoryError> {
        (**self).update_payment(payment, order)
    }

    fn list_payments(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        (**self).list_payments(order_id)
    }

    fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        (**self).find_payment(payment_id)
    }

    fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, RepositoryError> {
        (**self).find_payment_by_intent(intent_id)
    }
}
