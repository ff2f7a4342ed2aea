use thiserror::Error;

use procura_core::{DomainError, OrderId, PaymentId};
use procura_inventory::LedgerError;

use crate::gateway::GatewayError;
use crate::locks::LockError;
use crate::repository::RepositoryError;

/// Typed failure of an engine operation.
///
/// Only `Repository`, `Ledger` and `Lock` are unexpected faults; everything
/// else is a normal outcome the caller can act on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot {action} an order in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },

    /// Stale version; reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not a failure: the order is already paid.
    #[error("order {order_id} is already paid by payment {payment_id}")]
    PaymentAlreadyCompleted {
        order_id: OrderId,
        payment_id: PaymentId,
    },

    #[error(
        "over-receipt on item {item_id}: ordered {ordered}, already received {received}, attempted {attempted}"
    )]
    OverReceipt {
        item_id: String,
        ordered: i64,
        received: i64,
        attempted: i64,
    },

    /// Payment left PENDING when the failure is ambiguous, FAILED otherwise.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("repository failure: {0}")]
    Repository(RepositoryError),

    #[error("stock ledger failure: {0}")]
    Ledger(LedgerError),

    #[error("lock failure: {0}")]
    Lock(#[from] LockError),
}

impl EngineError {
    /// Whether retrying after a reload can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_) | EngineError::Gateway(_))
    }

    /// Faults that indicate a broken collaborator rather than a business outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Repository(_) | EngineError::Ledger(_) | EngineError::Lock(_)
        )
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvalidTransition { action, status } => {
                EngineError::InvalidTransition { action, status }
            }
            DomainError::OverReceipt {
                item_id,
                ordered,
                received,
                attempted,
            } => EngineError::OverReceipt {
                item_id,
                ordered,
                received,
                attempted,
            },
            DomainError::NotFound(msg) => EngineError::NotFound(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Concurrency(msg) => EngineError::Conflict(msg),
            // Lost a check-then-insert race on the active-payment slot.
            RepositoryError::Duplicate(msg) => EngineError::Conflict(msg),
            RepositoryError::NotFound(msg) => EngineError::NotFound(msg),
            other => EngineError::Repository(other),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::CausationMismatch(id) => EngineError::Validation(format!(
                "receipt id {id} was already used for a different receipt"
            )),
            other => EngineError::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retryable_classification() {
        assert!(EngineError::Conflict("stale".into()).is_retryable());
        assert!(EngineError::Gateway(GatewayError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(!EngineError::Validation("bad".into()).is_retryable());
        assert!(
            !EngineError::InvalidTransition {
                action: "close",
                status: "DRAFT".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn repository_errors_map_by_kind() {
        assert!(matches!(
            EngineError::from(RepositoryError::Concurrency("v".into())),
            EngineError::Conflict(_)
        ));
        let fatal = EngineError::from(RepositoryError::Unavailable("down".into()));
        assert!(fatal.is_fatal());
    }

    #[test]
    fn domain_errors_keep_their_meaning() {
        let err = EngineError::from(DomainError::invalid_transition("close", "DRAFT"));
        assert_eq!(err.to_string(), "cannot close an order in status DRAFT");
    }
}
