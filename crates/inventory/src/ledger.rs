use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use procura_core::{CausationId, ProductId};

/// Request to append one stock delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAppend {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: String,
    pub causation_id: CausationId,
}

/// One immutable line of the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    /// Position in the ledger (global, starts at 1).
    pub sequence: u64,
    pub product_id: ProductId,
    pub delta: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub causation_id: CausationId,
    pub recorded_at: DateTime<Utc>,
}

impl StockLedgerEntry {
    /// Build the entry that `request` produces on top of `previous_stock`.
    pub fn next(
        sequence: u64,
        previous_stock: i64,
        request: &StockAppend,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if request.delta == 0 {
            return Err(LedgerError::ZeroDelta);
        }

        let new_stock = previous_stock
            .checked_add(request.delta)
            .filter(|s| *s >= 0)
            .ok_or(LedgerError::NegativeStock {
                product_id: request.product_id,
                current: previous_stock,
                delta: request.delta,
            })?;

        Ok(Self {
            sequence,
            product_id: request.product_id,
            delta: request.delta,
            previous_stock,
            new_stock,
            reason: request.reason.clone(),
            causation_id: request.causation_id.clone(),
            recorded_at,
        })
    }

    /// Whether `request` describes the same write as this entry.
    pub fn matches(&self, request: &StockAppend) -> bool {
        self.product_id == request.product_id
            && self.delta == request.delta
            && self.causation_id == request.causation_id
    }
}

/// Result of an append.
///
/// `Duplicate` is a success: the causation id was already recorded, and the
/// original entry is returned unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Applied(StockLedgerEntry),
    Duplicate(StockLedgerEntry),
}

impl AppendOutcome {
    pub fn entry(&self) -> &StockLedgerEntry {
        match self {
            AppendOutcome::Applied(e) | AppendOutcome::Duplicate(e) => e,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("stock delta cannot be zero")]
    ZeroDelta,

    #[error("stock for product {product_id} cannot go negative (current {current}, delta {delta})")]
    NegativeStock {
        product_id: ProductId,
        current: i64,
        delta: i64,
    },

    /// The causation id was already used for a different write.
    #[error("causation id {0} was already recorded with a different product or delta")]
    CausationMismatch(CausationId),

    #[error("stock ledger unavailable: {0}")]
    Unavailable(String),
}

/// Append-only stock ledger with a current-quantity projection.
///
/// Implementations must:
/// - treat `causation_id` as the idempotency key of `append`
/// - never rewrite or delete an entry
/// - keep `new_stock` of the latest entry equal to `current_stock`
pub trait StockLedger: Send + Sync {
    fn append(&self, request: StockAppend) -> Result<AppendOutcome, LedgerError>;

    fn current_stock(&self, product_id: ProductId) -> Result<i64, LedgerError>;

    fn entries_for(&self, product_id: ProductId) -> Result<Vec<StockLedgerEntry>, LedgerError>;
}

impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    fn append(&self, request: StockAppend) -> Result<AppendOutcome, LedgerError> {
        (**self).append(request)
    }

    fn current_stock(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        (**self).current_stock(product_id)
    }

    fn entries_for(&self, product_id: ProductId) -> Result<Vec<StockLedgerEntry>, LedgerError> {
        (**self).entries_for(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(delta: i64) -> StockAppend {
        StockAppend {
            product_id: ProductId::new(),
            delta,
            reason: "purchase receipt".to_string(),
            causation_id: CausationId::new("r-1").unwrap(),
        }
    }

    #[test]
    fn next_entry_carries_previous_and_new_stock() {
        let entry = StockLedgerEntry::next(4, 10, &request(5), Utc::now()).unwrap();
        assert_eq!(entry.previous_stock, 10);
        assert_eq!(entry.new_stock, 15);
        assert_eq!(entry.sequence, 4);
    }

    #[test]
    fn zero_and_negative_results_are_rejected() {
        assert_eq!(
            StockLedgerEntry::next(1, 0, &request(0), Utc::now()).unwrap_err(),
            LedgerError::ZeroDelta
        );
        assert!(matches!(
            StockLedgerEntry::next(1, 2, &request(-3), Utc::now()).unwrap_err(),
            LedgerError::NegativeStock { current: 2, delta: -3, .. }
        ));
    }

    #[test]
    fn matches_compares_the_write_not_the_position() {
        let req = request(5);
        let entry = StockLedgerEntry::next(1, 0, &req, Utc::now()).unwrap();
        assert!(entry.matches(&req));

        let mut other = req.clone();
        other.delta = 6;
        assert!(!entry.matches(&other));
    }
}
