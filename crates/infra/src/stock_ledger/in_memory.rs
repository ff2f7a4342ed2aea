use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use procura_core::{CausationId, ProductId};
use procura_inventory::{AppendOutcome, LedgerError, StockAppend, StockLedger, StockLedgerEntry};

#[derive(Debug, Default)]
struct State {
    entries: Vec<StockLedgerEntry>,
    by_causation: HashMap<CausationId, usize>,
    stock: HashMap<ProductId, i64>,
}

/// In-memory append-only stock ledger.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    state: RwLock<State>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all products.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> LedgerError {
        LedgerError::Unavailable("lock poisoned".to_string())
    }
}

impl StockLedger for InMemoryStockLedger {
    fn append(&self, request: StockAppend) -> Result<AppendOutcome, LedgerError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        if let Some(&idx) = state.by_causation.get(&request.causation_id) {
            let existing = &state.entries[idx];
            if !existing.matches(&request) {
                return Err(LedgerError::CausationMismatch(request.causation_id));
            }
            return Ok(AppendOutcome::Duplicate(existing.clone()));
        }

        let current = state.stock.get(&request.product_id).copied().unwrap_or(0);
        let sequence = state.entries.len() as u64 + 1;
        let entry = StockLedgerEntry::next(sequence, current, &request, Utc::now())?;

        let idx = state.entries.len();
        state.stock.insert(entry.product_id, entry.new_stock);
        state.by_causation.insert(entry.causation_id.clone(), idx);
        state.entries.push(entry.clone());

        Ok(AppendOutcome::Applied(entry))
    }

    fn current_stock(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.stock.get(&product_id).copied().unwrap_or(0))
    }

    fn entries_for(&self, product_id: ProductId) -> Result<Vec<StockLedgerEntry>, LedgerError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }
}
