//! Purchase order lifecycle and payment reconciliation engine.
//!
//! `ProcurementEngine` composes the collaborators (order repository, payment
//! gateway, stock ledger, event bus) around the pure `PurchaseOrder`
//! aggregate. Every operation follows the same pipeline:
//!
//! ```text
//! per-order lock
//!   -> load order (+ payments)
//!   -> aggregate.handle(command)      pure decision, typed rejection
//!   -> external side effect           gateway call / ledger append
//!   -> repository compare-and-set     guarded by status + version
//!   -> publish events                 after commit, failures only logged
//! ```
//!
//! The operations are split by concern:
//! - `state_machine`: create, add items, approve, cancel, close, mark paid/received
//! - `payments`: initiate, reconcile (by payment id or gateway intent id)
//! - `receiving`: goods receipts and stock ledger appends

mod error;
mod payments;
mod receiving;
mod state_machine;
mod view;

pub use error::EngineError;
pub use state_machine::{NewPurchaseItem, NewPurchaseOrder};
pub use view::{ItemView, OrderView, PaymentOutcome, PaymentView, ReceiptOutcome, ReconcileOutcome};

use serde::Serialize;
use serde_json::Value as JsonValue;

use procura_core::OrderId;
use procura_events::{Event, EventBus, EventEnvelope, EventStream};
use procura_purchasing::{Payment, PaymentEvent};

use crate::config::EngineConfig;
use crate::locks::OrderLocks;

/// Orchestrates order transitions, payments and receipts.
///
/// Generic over its collaborators so tests and the API can plug in in-memory
/// implementations (or `Arc`s of them) while production wires real backends.
#[derive(Debug)]
pub struct ProcurementEngine<R, G, L, B> {
    repository: R,
    gateway: G,
    ledger: L,
    bus: B,
    locks: OrderLocks,
    config: EngineConfig,
}

impl<R, G, L, B> ProcurementEngine<R, G, L, B> {
    pub fn new(repository: R, gateway: G, ledger: L, bus: B, config: EngineConfig) -> Self {
        Self {
            repository,
            gateway,
            ledger,
            bus,
            locks: OrderLocks::new(),
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `f` under the per-order lock.
    fn with_lock<T>(
        &self,
        order_id: OrderId,
        f: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.locks.with_order_lock(order_id, f)
    }
}

impl<R, G, L, B> ProcurementEngine<R, G, L, B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Publish committed events; `base_version` is the order version before them.
    ///
    /// Each envelope is sequenced by the order version right after its event.
    fn publish_all<E>(&self, order_id: OrderId, base_version: u64, events: &[E])
    where
        E: Event + Serialize,
    {
        for (idx, event) in events.iter().enumerate() {
            self.publish(order_id, EventStream::Order, base_version + idx as u64 + 1, event);
        }
    }

    /// Publish a payment event on the payment's own stream, numbered by the
    /// revision the change produced.
    fn publish_payment(&self, payment: &Payment, event: &PaymentEvent) {
        self.publish(
            payment.purchase_order_id,
            EventStream::Payment(payment.id),
            payment.revision,
            event,
        );
    }

    /// Publish one committed event. The state is already durable, so a
    /// failure here is logged and never propagated.
    fn publish<E>(&self, order_id: OrderId, stream: EventStream, sequence: u64, event: &E)
    where
        E: Event + Serialize,
    {
        let envelope = match EventEnvelope::from_typed(order_id, stream, sequence, event) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(
                    order_id = %order_id,
                    event_type = event.event_type(),
                    error = %err,
                    "failed to serialize event; not published"
                );
                return;
            }
        };

        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(
                order_id = %order_id,
                event_type = event.event_type(),
                error = ?err,
                "event publication failed after commit"
            );
        }
    }
}
