use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::instrument;

use procura_core::{AggregateRoot, OrderId, PaymentId};
use procura_events::{EventBus, EventEnvelope};
use procura_inventory::StockLedger;
use procura_purchasing::{
    GatewayStatus, OrderStatus, Payment, PaymentEvent, PaymentInitiated, PaymentStatus,
    PaymentStatusChanged, PurchaseOrder, PurchaseOrderCommand, StatusChange,
};

use super::state_machine::decide;
use super::{EngineError, OrderView, PaymentOutcome, PaymentView, ProcurementEngine, ReconcileOutcome};
use crate::gateway::{IntentRequest, PaymentGateway};
use crate::repository::{OrderRepository, StatusWrite};

/// Checks shared by the lock-free fast path and the locked re-check.
///
/// `Ok(Some(_))` hands back an open intent, `Ok(None)` means a new (or
/// retried) gateway call is needed.
fn settled_or_reusable(
    order: &PurchaseOrder,
    payments: &[Payment],
) -> Result<Option<PaymentOutcome>, EngineError> {
    if let Some(paid) = payments.iter().find(|p| p.status == PaymentStatus::Succeeded) {
        return Err(EngineError::PaymentAlreadyCompleted {
            order_id: order.id_typed(),
            payment_id: paid.id,
        });
    }
    if order.status() != OrderStatus::Approved {
        return Err(EngineError::InvalidTransition {
            action: "initiate payment for",
            status: order.status().to_string(),
        });
    }

    let open = payments
        .iter()
        .find(|p| p.status.is_open() && !p.awaiting_intent());
    Ok(open.map(|p| PaymentOutcome {
        payment: PaymentView::from(p),
        reused: true,
    }))
}

impl<R, G, L, B> ProcurementEngine<R, G, L, B>
where
    R: OrderRepository,
    G: PaymentGateway,
    L: StockLedger,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create or reuse the single chargeable intent of an APPROVED order.
    ///
    /// Concurrent callers on the same order all receive the same intent: the
    /// check-then-insert runs under the per-order lock, and the gateway call
    /// carries an idempotency key derived from the order and attempt number.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub fn initiate_payment(&self, order_id: OrderId) -> Result<PaymentOutcome, EngineError> {
        let order = self.load_order(order_id)?;
        let payments = self.repository.list_payments(order_id)?;
        if let Some(reused) = settled_or_reusable(&order, &payments)? {
            tracing::debug!(payment_id = %reused.payment.id, "reusing open payment intent");
            return Ok(reused);
        }

        self.with_lock(order_id, || {
            let order = self.load_order(order_id)?;
            let payments = self.repository.list_payments(order_id)?;
            if let Some(reused) = settled_or_reusable(&order, &payments)? {
                return Ok(reused);
            }

            // No payment row for an amount the gateway cannot take.
            order.total_amount().minor_units()?;

            let next_attempt = payments.iter().map(|p| p.attempt).max().unwrap_or(0) + 1;
            let payment = match payments.into_iter().find(|p| p.status.is_open()) {
                // A previous create timed out: retry it under the same key.
                Some(pending) => pending,
                None => {
                    let reserved = Payment::reserve(
                        order_id,
                        next_attempt,
                        order.total_amount(),
                        self.config.currency.clone(),
                        Utc::now(),
                    );
                    self.repository.insert_payment(&reserved)?;
                    reserved
                }
            };

            self.create_intent(&order, payment)
        })
    }

    fn create_intent(
        &self,
        order: &PurchaseOrder,
        mut payment: Payment,
    ) -> Result<PaymentOutcome, EngineError> {
        match self.gateway.create_intent(&self.intent_request(&payment)) {
            Ok(created) => {
                payment.attach_intent(created.intent_id.clone(), created.client_secret, Utc::now());
                self.repository.update_payment(&payment, None)?;

                tracing::info!(
                    order_id = %order.id_typed(),
                    payment_id = %payment.id,
                    intent_id = %created.intent_id,
                    attempt = payment.attempt,
                    "payment intent created"
                );
                self.publish_payment(
                    &payment,
                    &PaymentEvent::Initiated(PaymentInitiated {
                        payment_id: payment.id,
                        order_id: order.id_typed(),
                        attempt: payment.attempt,
                        amount: payment.amount,
                        intent_id: created.intent_id,
                        occurred_at: payment.updated_at,
                    }),
                );
                Ok(PaymentOutcome {
                    payment: PaymentView::from(&payment),
                    reused: false,
                })
            }
            Err(err) if err.is_ambiguous() => {
                tracing::warn!(
                    order_id = %order.id_typed(),
                    payment_id = %payment.id,
                    error = %err,
                    "intent creation outcome unknown; payment left PENDING for retry"
                );
                Err(EngineError::Gateway(err))
            }
            Err(err) => {
                let now = Utc::now();
                if let StatusChange::Applied { from, to } =
                    payment.apply_status(PaymentStatus::Failed, now)
                {
                    self.repository.update_payment(&payment, None)?;
                    self.publish_status_change(&payment, from, to);
                }
                tracing::warn!(
                    order_id = %order.id_typed(),
                    payment_id = %payment.id,
                    error = %err,
                    "gateway rejected intent creation; payment FAILED"
                );
                Err(EngineError::Gateway(err))
            }
        }
    }

    /// Fold a gateway-reported status into a payment.
    ///
    /// Idempotent and order-insensitive: repeats and stale reports (lower rank
    /// than what is stored) change nothing. SUCCEEDED moves an APPROVED order
    /// to PAID in the same repository write as the payment update.
    #[instrument(skip(self), fields(payment_id = %payment_id, status = ?status), err)]
    pub fn reconcile_payment(
        &self,
        payment_id: PaymentId,
        status: GatewayStatus,
    ) -> Result<ReconcileOutcome, EngineError> {
        let payment = self
            .repository
            .find_payment(payment_id)?
            .ok_or_else(|| EngineError::not_found(format!("payment {payment_id}")))?;

        self.with_lock(payment.purchase_order_id, || {
            self.reconcile_locked(payment_id, status.to_payment_status())
        })
    }

    /// Webhook entry point: resolve the payment by gateway intent id.
    #[instrument(skip(self), fields(intent_id = %intent_id, status = ?status), err)]
    pub fn reconcile_intent(
        &self,
        intent_id: &str,
        status: GatewayStatus,
    ) -> Result<ReconcileOutcome, EngineError> {
        let payment = self
            .repository
            .find_payment_by_intent(intent_id)?
            .ok_or_else(|| EngineError::not_found(format!("payment intent {intent_id}")))?;

        self.with_lock(payment.purchase_order_id, || {
            self.reconcile_locked(payment.id, status.to_payment_status())
        })
    }

    fn reconcile_locked(
        &self,
        payment_id: PaymentId,
        reported: PaymentStatus,
    ) -> Result<ReconcileOutcome, EngineError> {
        let mut payment = self
            .repository
            .find_payment(payment_id)?
            .ok_or_else(|| EngineError::not_found(format!("payment {payment_id}")))?;
        let order = self.load_order(payment.purchase_order_id)?;

        let change = payment.apply_status(reported, Utc::now());
        if let StatusChange::Stale { current, reported } = change {
            tracing::debug!(
                payment_id = %payment_id,
                current = %current,
                reported = %reported,
                "stale payment status ignored"
            );
        }
        let applied = matches!(change, StatusChange::Applied { .. });

        // Also covers a SUCCEEDED payment whose order commit was lost.
        if payment.status == PaymentStatus::Succeeded && order.status() == OrderStatus::Approved {
            let (paid, events) = decide(
                &order,
                &PurchaseOrderCommand::MarkPaid {
                    payment_id,
                    occurred_at: payment.updated_at,
                },
            )?;
            self.repository.update_payment(
                &payment,
                Some(StatusWrite::new(order.status(), order.version(), &paid)),
            )?;

            if let StatusChange::Applied { from, to } = change {
                self.publish_status_change(&payment, from, to);
            }
            self.publish_all(order.id_typed(), order.version(), &events);
            tracing::info!(
                order_id = %order.id_typed(),
                payment_id = %payment_id,
                "payment succeeded; order PAID"
            );

            return Ok(ReconcileOutcome {
                payment: PaymentView::from(&payment),
                order: OrderView::from(&paid),
                applied: true,
            });
        }

        if let StatusChange::Applied { from, to } = change {
            self.repository.update_payment(&payment, None)?;
            self.publish_status_change(&payment, from, to);

            if to == PaymentStatus::Succeeded {
                tracing::error!(
                    order_id = %order.id_typed(),
                    payment_id = %payment_id,
                    order_status = %order.status(),
                    "payment succeeded for an order that cannot be paid; refund required"
                );
            } else {
                tracing::info!(
                    order_id = %order.id_typed(),
                    payment_id = %payment_id,
                    from = %from,
                    to = %to,
                    "payment status updated"
                );
            }
        }

        Ok(ReconcileOutcome {
            payment: PaymentView::from(&payment),
            order: OrderView::from(&order),
            applied,
        })
    }

    /// Payments of an order, oldest attempt first.
    pub fn list_payments(&self, order_id: OrderId) -> Result<Vec<PaymentView>, EngineError> {
        self.load_order(order_id)?;
        Ok(self
            .repository
            .list_payments(order_id)?
            .iter()
            .map(PaymentView::from)
            .collect())
    }

    /// Best-effort gateway cancel of every open payment. Caller holds the
    /// order lock and has already checked that the order may be cancelled.
    ///
    /// A payment whose create call never answered may still have a live
    /// intent, so its create is replayed under the same idempotency key to
    /// learn the intent id before cancelling. Payments the gateway could not
    /// cancel stay open for a later webhook to settle.
    pub(super) fn cancel_open_payments(&self, order: &PurchaseOrder) -> Result<(), EngineError> {
        let open: Vec<Payment> = self
            .repository
            .list_payments(order.id_typed())?
            .into_iter()
            .filter(|p| p.status.is_open())
            .collect();

        for mut payment in open {
            let intent_id = match payment.external_intent_id.clone() {
                Some(intent_id) => Some(intent_id),
                None => self.recover_intent(&mut payment)?,
            };
            let Some(intent_id) = intent_id else {
                continue;
            };

            if let Err(err) = self.gateway.cancel_intent(&intent_id) {
                tracing::warn!(
                    order_id = %order.id_typed(),
                    payment_id = %payment.id,
                    intent_id = %intent_id,
                    error = %err,
                    "gateway cancel failed; cancelling order anyway"
                );
                continue;
            }

            if let StatusChange::Applied { from, to } =
                payment.apply_status(PaymentStatus::Canceled, Utc::now())
            {
                self.repository.update_payment(&payment, None)?;
                self.publish_status_change(&payment, from, to);
            }
        }
        Ok(())
    }

    /// Replay the create of a payment that is still awaiting its intent and
    /// store the intent id the gateway reports. `None` if the gateway did not
    /// answer with one.
    fn recover_intent(&self, payment: &mut Payment) -> Result<Option<String>, EngineError> {
        match self.gateway.create_intent(&self.intent_request(payment)) {
            Ok(created) => {
                payment.attach_intent(created.intent_id.clone(), created.client_secret, Utc::now());
                self.repository.update_payment(payment, None)?;
                tracing::info!(
                    payment_id = %payment.id,
                    intent_id = %created.intent_id,
                    "recovered intent id of an unanswered create"
                );
                Ok(Some(created.intent_id))
            }
            Err(err) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    idempotency_key = %payment.idempotency_key,
                    error = %err,
                    "could not recover intent for cancel; payment left PENDING"
                );
                Ok(None)
            }
        }
    }

    fn intent_request(&self, payment: &Payment) -> IntentRequest {
        IntentRequest {
            amount: payment.amount,
            currency: payment.currency.clone(),
            idempotency_key: payment.idempotency_key.clone(),
            timeout: self.config.gateway_timeout,
        }
    }

    fn publish_status_change(&self, payment: &Payment, from: PaymentStatus, to: PaymentStatus) {
        self.publish_payment(
            payment,
            &PaymentEvent::StatusChanged(PaymentStatusChanged {
                payment_id: payment.id,
                order_id: payment.purchase_order_id,
                from,
                to,
                occurred_at: payment.updated_at,
            }),
        );
    }
}
