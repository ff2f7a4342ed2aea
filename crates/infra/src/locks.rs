//! In-process advisory locks keyed by order id.
//!
//! Every multi-step operation on one order (read, check, external call, write)
//! runs inside `OrderLocks::with_order_lock`. Different orders never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use procura_core::OrderId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("order lock registry poisoned")]
    Poisoned,
}

/// Registry of per-order mutexes.
///
/// Entries are created on first use and dropped once no caller holds or waits
/// for them, so the registry only tracks orders that are currently busy.
#[derive(Debug, Default)]
pub struct OrderLocks {
    registry: Mutex<HashMap<OrderId, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `order_id`.
    pub fn with_order_lock<T, E>(
        &self,
        order_id: OrderId,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LockError>,
    {
        let handle = {
            let mut registry = self.registry.lock().map_err(|_| LockError::Poisoned)?;
            registry.entry(order_id).or_default().clone()
        };

        let result = {
            // The mutex guards no data; state lives in the repository.
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        self.release(order_id, handle)?;
        result
    }

    fn release(&self, order_id: OrderId, handle: Arc<Mutex<()>>) -> Result<(), LockError> {
        let mut registry = self.registry.lock().map_err(|_| LockError::Poisoned)?;
        // Give up our reference under the registry lock so the count below
        // cannot include another releaser that has not dropped its handle yet.
        drop(handle);
        if registry
            .get(&order_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            registry.remove(&order_id);
        }
        Ok(())
    }

    /// Number of orders with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.registry.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_order_is_serialized() {
        let locks = Arc::new(OrderLocks::new());
        let order_id = OrderId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    locks
                        .with_order_lock(order_id, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(2));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, LockError>(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entries_are_pruned_after_use() {
        let locks = OrderLocks::new();
        let value = locks
            .with_order_lock(OrderId::new(), || Ok::<_, LockError>(7))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn back_to_back_releases_leave_no_entry() {
        let locks = Arc::new(OrderLocks::new());
        let order_id = OrderId::new();

        for _ in 0..200 {
            let barrier = Arc::new(Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let locks = locks.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        locks
                            .with_order_lock(order_id, || Ok::<_, LockError>(()))
                            .unwrap();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(locks.tracked(), 0);
        }
    }

    #[test]
    fn errors_from_the_closure_pass_through() {
        let locks = OrderLocks::new();
        let err = locks
            .with_order_lock(OrderId::new(), || Err::<(), _>(LockError::Poisoned))
            .unwrap_err();
        assert_eq!(err, LockError::Poisoned);
        assert_eq!(locks.tracked(), 0);
    }
}
