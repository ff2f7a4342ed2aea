use std::collections::HashMap;
use std::sync::RwLock;

use procura_core::{AggregateRoot, ExpectedVersion, OrderId, PaymentId};
use procura_purchasing::{Payment, PurchaseOrder};

use super::r#trait::{OrderRepository, RepositoryError, StatusWrite};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, PurchaseOrder>,
    payments: HashMap<PaymentId, Payment>,
    by_intent: HashMap<String, PaymentId>,
}

impl State {
    fn check_status_write(&self, write: &StatusWrite<'_>) -> Result<(), RepositoryError> {
        let order_id = write.order_id();
        let stored = self
            .orders
            .get(&order_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("purchase order {order_id}")))?;

        if stored.status() != write.expected_status || stored.version() != write.expected_version {
            return Err(RepositoryError::Concurrency(format!(
                "expected {} at version {}, found {} at version {}",
                write.expected_status,
                write.expected_version,
                stored.status(),
                stored.version()
            )));
        }
        if write.order.version() <= stored.version() {
            return Err(RepositoryError::InvalidWrite(format!(
                "new version {} does not advance stored version {}",
                write.order.version(),
                stored.version()
            )));
        }
        Ok(())
    }

    fn check_payment_row(&self, payment: &Payment) -> Result<(), RepositoryError> {
        if !self.orders.contains_key(&payment.purchase_order_id) {
            return Err(RepositoryError::NotFound(format!(
                "purchase order {}",
                payment.purchase_order_id
            )));
        }

        if payment.status.is_active() {
            let other_active = self.payments.values().any(|p| {
                p.purchase_order_id == payment.purchase_order_id
                    && p.id != payment.id
                    && p.status.is_active()
            });
            if other_active {
                return Err(RepositoryError::Duplicate(format!(
                    "order {} already has an active payment",
                    payment.purchase_order_id
                )));
            }
        }

        if let Some(intent_id) = &payment.external_intent_id {
            if let Some(owner) = self.by_intent.get(intent_id) {
                if *owner != payment.id {
                    return Err(RepositoryError::Duplicate(format!(
                        "intent {intent_id} already belongs to payment {owner}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn put_payment(&mut self, payment: &Payment) {
        if let Some(intent_id) = &payment.external_intent_id {
            self.by_intent.insert(intent_id.clone(), payment.id);
        }
        self.payments.insert(payment.id, payment.clone());
    }
}

/// In-memory order repository.
///
/// Intended for tests/dev. One lock covers orders and payments so combined
/// writes are atomic.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    state: RwLock<State>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> RepositoryError {
        RepositoryError::Unavailable("lock poisoned".to_string())
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn insert(&self, order: &PurchaseOrder) -> Result<(), RepositoryError> {
        if !order.is_created() {
            return Err(RepositoryError::InvalidWrite(
                "cannot insert an order that was never drafted".to_string(),
            ));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let order_id = order.id_typed();
        if state.orders.contains_key(&order_id) {
            return Err(RepositoryError::Duplicate(format!("purchase order {order_id}")));
        }
        state.orders.insert(order_id, order.clone());
        Ok(())
    }

    fn load(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.orders.get(&order_id).cloned())
    }

    fn save(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let order_id = order.id_typed();
        let stored = state
            .orders
            .get(&order_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("purchase order {order_id}")))?;

        if !expected.matches(stored.version()) {
            return Err(RepositoryError::Concurrency(format!(
                "expected {expected:?}, found {}",
                stored.version()
            )));
        }
        if stored.status() != order.status() {
            return Err(RepositoryError::InvalidWrite(
                "status changes must go through compare_and_set_status".to_string(),
            ));
        }

        state.orders.insert(order_id, order.clone());
        Ok(())
    }

    fn compare_and_set_status(&self, write: StatusWrite<'_>) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.check_status_write(&write)?;
        state.orders.insert(write.order_id(), write.order.clone());
        Ok(())
    }

    fn insert_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.payments.contains_key(&payment.id) {
            return Err(RepositoryError::Duplicate(format!("payment {}", payment.id)));
        }
        state.check_payment_row(payment)?;
        state.put_payment(payment);
        Ok(())
    }

    fn update_payment(
        &self,
        payment: &Payment,
        order: Option<StatusWrite<'_>>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if !state.payments.contains_key(&payment.id) {
            return Err(RepositoryError::NotFound(format!("payment {}", payment.id)));
        }
        state.check_payment_row(payment)?;
        if let Some(write) = &order {
            if write.order_id() != payment.purchase_order_id {
                return Err(RepositoryError::InvalidWrite(
                    "payment and order write target different orders".to_string(),
                ));
            }
            state.check_status_write(write)?;
        }

        // All checks passed: both writes land under the same lock.
        state.put_payment(payment);
        if let Some(write) = order {
            state.orders.insert(write.order_id(), write.order.clone());
        }
        Ok(())
    }

    fn list_payments(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.purchase_order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.attempt);
        Ok(payments)
    }

    fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.payments.get(&payment_id).cloned())
    }

    fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, RepositoryError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .by_intent
            .get(intent_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }
}
