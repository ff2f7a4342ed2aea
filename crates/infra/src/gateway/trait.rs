use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use procura_core::Money;

/// Request to create one payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount: Money,
    pub currency: String,
    /// Same key, same intent: the gateway deduplicates on it.
    pub idempotency_key: String,
    pub timeout: Duration,
}

/// Intent handle returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No answer within the deadline; the intent may or may not exist.
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway declined the request: {0}")]
    Declined(String),

    #[error("gateway rejected the amount: {0}")]
    InvalidAmount(String),

    #[error("unknown intent {0}")]
    UnknownIntent(String),
}

impl GatewayError {
    /// Whether the call may have taken effect remotely.
    ///
    /// Ambiguous failures leave the local payment PENDING so a retry with the
    /// same idempotency key picks the intent back up.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Unavailable(_))
    }
}

/// External payment processor.
///
/// Calls block for at most the request's timeout.
pub trait PaymentGateway: Send + Sync {
    fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError>;

    fn cancel_intent(&self, intent_id: &str) -> Result<(), GatewayError>;
}

impl<G> PaymentGateway for Arc<G>
where
    G: PaymentGateway + ?Sized,
{
    fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        (**self).create_intent(request)
    }

    fn cancel_intent(&self, intent_id: &str) -> Result<(), GatewayError> {
        (**self).cancel_intent(intent_id)
    }
}
