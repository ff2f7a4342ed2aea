//! Receipt-event identity shared by purchasing and the stock ledger.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{OrderId, PurchaseItemId};

/// Identifier of one physical receipt event.
///
/// The same value is recorded on the order (applied receipts) and on the
/// stock ledger entry, so replaying a receipt is detectable on both sides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CausationId(String);

impl CausationId {
    /// Accept a caller-supplied receipt token.
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("causation id cannot be empty"));
        }
        if trimmed.len() > 200 {
            return Err(DomainError::validation("causation id is longer than 200 characters"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// `order_id:item_id:sequence`, where `sequence` is the 1-based receipt
    /// number for the item.
    pub fn derived(order_id: OrderId, item_id: PurchaseItemId, sequence: u32) -> Self {
        Self(format!("{order_id}:{item_id}:{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CausationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
