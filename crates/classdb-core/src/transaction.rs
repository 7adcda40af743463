//! Hooks into the data transaction layer.
//!
//! Schema changes are not transactional. The catalog brackets every write
//! lock hold with an exclusive metadata change and refuses structural
//! changes while the caller has a data transaction open.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Transaction-layer operations the catalog relies on.
pub trait TransactionCoordinator: Send + Sync {
    /// Called before the schema write lock is taken.
    fn start_exclusive_metadata_change(&self);

    /// Called after the schema write lock is released, on every path.
    fn end_exclusive_metadata_change(&self);

    /// Whether the calling session has an open data transaction.
    fn is_active_transaction(&self) -> bool;
}

/// In-process transaction state for a single session.
#[derive(Debug, Default)]
pub struct LocalTransactions {
    active: AtomicBool,
    exclusive_depth: AtomicUsize,
}

impl LocalTransactions {
    /// Create state with no open transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a data transaction.
    pub fn begin(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Close the open data transaction.
    pub fn commit(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Abandon the open data transaction.
    pub fn rollback(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Number of exclusive metadata changes currently in progress.
    pub fn exclusive_depth(&self) -> usize {
        self.exclusive_depth.load(Ordering::SeqCst)
    }
}

impl TransactionCoordinator for LocalTransactions {
    fn start_exclusive_metadata_change(&self) {
        let depth = self.exclusive_depth.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(depth, "exclusive metadata change started");
    }

    fn end_exclusive_metadata_change(&self) {
        // Saturating: an unmatched end must not wrap the counter.
        let _ = self
            .exclusive_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
        debug!(depth = self.exclusive_depth(), "exclusive metadata change ended");
    }

    fn is_active_transaction(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_flag() {
        let tx = LocalTransactions::new();
        assert!(!tx.is_active_transaction());
        tx.begin();
        assert!(tx.is_active_transaction());
        tx.rollback();
        assert!(!tx.is_active_transaction());
    }

    #[test]
    fn test_exclusive_depth() {
        let tx = LocalTransactions::new();
        tx.start_exclusive_metadata_change();
        tx.start_exclusive_metadata_change();
        assert_eq!(tx.exclusive_depth(), 2);
        tx.end_exclusive_metadata_change();
        tx.end_exclusive_metadata_change();
        tx.end_exclusive_metadata_change();
        assert_eq!(tx.exclusive_depth(), 0);
    }
}
