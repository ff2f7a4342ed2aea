//! Payment attempts against the external gateway.
//!
//! A `Payment` is the local record of one gateway intent. It lives next to
//! its order but is persisted on its own, so an intent created just before a
//! crash can still be found and reconciled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{Money, OrderId, PaymentId};
use procura_events::Event;

/// Local payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    /// Position in the gateway's reporting order:
    /// PENDING(0) -> PROCESSING(1) -> SUCCEEDED | FAILED | CANCELED(2).
    pub fn rank(self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Processing => 1,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Canceled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Counts against the "one active payment per order" rule.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Succeeded
        )
    }

    /// Still chargeable: an intent the payer may complete.
    pub fn is_open(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Canceled => "CANCELED",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as reported by the gateway (webhook or confirmation call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    #[serde(alias = "requires_confirmation", alias = "requires_action")]
    Pending,
    Processing,
    Succeeded,
    /// The payer must supply a new method; terminal for this intent.
    RequiresPaymentMethod,
    Failed,
    Canceled,
}

impl GatewayStatus {
    pub fn to_payment_status(self) -> PaymentStatus {
        match self {
            GatewayStatus::Pending => PaymentStatus::Pending,
            GatewayStatus::Processing => PaymentStatus::Processing,
            GatewayStatus::Succeeded => PaymentStatus::Succeeded,
            GatewayStatus::RequiresPaymentMethod | GatewayStatus::Failed => PaymentStatus::Failed,
            GatewayStatus::Canceled => PaymentStatus::Canceled,
        }
    }
}

/// Outcome of folding a reported status into a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// Same status reported again.
    Unchanged,
    /// Reported status ranks below the current one, or the payment is
    /// already terminal with a different outcome.
    Stale {
        current: PaymentStatus,
        reported: PaymentStatus,
    },
}

impl StatusChange {
    pub fn evaluate(current: PaymentStatus, reported: PaymentStatus) -> Self {
        if current == reported {
            return StatusChange::Unchanged;
        }
        if current.is_terminal() || reported.rank() < current.rank() {
            return StatusChange::Stale { current, reported };
        }
        StatusChange::Applied {
            from: current,
            to: reported,
        }
    }
}

/// Local record of one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub purchase_order_id: OrderId,
    /// 1-based attempt number for the order; part of the idempotency key.
    pub attempt: u32,
    pub idempotency_key: String,
    /// `None` while the gateway has not yet confirmed the intent creation.
    pub external_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    /// Bumped on every change to the row; numbers the payment's events.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Reserve a new attempt before the gateway is called.
    pub fn reserve(
        order_id: OrderId,
        attempt: u32,
        amount: Money,
        currency: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            purchase_order_id: order_id,
            attempt,
            idempotency_key: Self::idempotency_key(order_id, attempt),
            external_intent_id: None,
            client_secret: None,
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            revision: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Deterministic per (order, attempt): a retried create after a timeout
    /// reaches the gateway with the same key and gets the same intent back.
    pub fn idempotency_key(order_id: OrderId, attempt: u32) -> String {
        format!("po-{order_id}-attempt-{attempt}")
    }

    pub fn awaiting_intent(&self) -> bool {
        self.external_intent_id.is_none()
    }

    pub fn attach_intent(
        &mut self,
        intent_id: impl Into<String>,
        client_secret: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.external_intent_id = Some(intent_id.into());
        self.client_secret = Some(client_secret.into());
        self.updated_at = at;
        self.revision += 1;
    }

    /// Fold a reported status in, honouring the monotonic rank.
    pub fn apply_status(&mut self, reported: PaymentStatus, at: DateTime<Utc>) -> StatusChange {
        let change = StatusChange::evaluate(self.status, reported);
        if let StatusChange::Applied { to, .. } = change {
            self.status = to;
            self.updated_at = at;
            self.revision += 1;
        }
        change
    }
}

/// Event: PaymentInitiated (intent created at the gateway and persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub attempt: u32,
    pub amount: Money,
    pub intent_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChanged {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    Initiated(PaymentInitiated),
    StatusChanged(PaymentStatusChanged),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Initiated(_) => "purchasing.payment.initiated",
            PaymentEvent::StatusChanged(_) => "purchasing.payment.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::Initiated(e) => e.occurred_at,
            PaymentEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment() -> Payment {
        Payment::reserve(
            OrderId::new(),
            1,
            Money::new(dec!(150)).unwrap(),
            "usd",
            Utc::now(),
        )
    }

    #[test]
    fn reserved_payment_is_pending_without_intent() {
        let p = payment();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert!(p.awaiting_intent());
        assert!(p.idempotency_key.ends_with("-attempt-1"));
    }

    #[test]
    fn status_only_moves_forward() {
        let mut p = payment();

        assert!(matches!(
            p.apply_status(PaymentStatus::Processing, Utc::now()),
            StatusChange::Applied { .. }
        ));
        assert!(matches!(
            p.apply_status(PaymentStatus::Pending, Utc::now()),
            StatusChange::Stale { .. }
        ));
        assert_eq!(p.status, PaymentStatus::Processing);

        assert!(matches!(
            p.apply_status(PaymentStatus::Succeeded, Utc::now()),
            StatusChange::Applied { .. }
        ));
        assert_eq!(
            p.apply_status(PaymentStatus::Succeeded, Utc::now()),
            StatusChange::Unchanged
        );
    }

    #[test]
    fn revision_counts_only_real_changes() {
        let mut p = payment();
        assert_eq!(p.revision, 0);
        p.attach_intent("pi_1", "pi_1_secret", Utc::now());
        assert_eq!(p.revision, 1);
        p.apply_status(PaymentStatus::Processing, Utc::now());
        p.apply_status(PaymentStatus::Processing, Utc::now());
        p.apply_status(PaymentStatus::Pending, Utc::now());
        assert_eq!(p.revision, 2);
    }

    #[test]
    fn terminal_outcomes_are_final() {
        let mut p = payment();
        p.apply_status(PaymentStatus::Succeeded, Utc::now());

        assert!(matches!(
            p.apply_status(PaymentStatus::Failed, Utc::now()),
            StatusChange::Stale { .. }
        ));
        assert_eq!(p.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn pending_can_jump_straight_to_an_outcome() {
        let mut p = payment();
        assert!(matches!(
            p.apply_status(PaymentStatus::Failed, Utc::now()),
            StatusChange::Applied { from: PaymentStatus::Pending, to: PaymentStatus::Failed }
        ));
    }

    #[test]
    fn requires_payment_method_maps_to_failed() {
        assert_eq!(
            GatewayStatus::RequiresPaymentMethod.to_payment_status(),
            PaymentStatus::Failed
        );
        let parsed: GatewayStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(parsed, GatewayStatus::Pending);
    }

    #[test]
    fn activity_classification() {
        assert!(PaymentStatus::Succeeded.is_active());
        assert!(!PaymentStatus::Succeeded.is_open());
        assert!(PaymentStatus::Processing.is_open());
        assert!(!PaymentStatus::Failed.is_active());
        assert!(!PaymentStatus::Canceled.is_active());
    }
}
