//! Side-table of in-flight fan-out operations
//!
//! Entries are observed through `Weak` references keyed by id and removed by
//! the barrier's own completion callback; the table never keeps an operation
//! alive.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::barrier::CompletionBarrier;

#[derive(Default)]
pub(crate) struct OperationTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Weak<CompletionBarrier>>>,
}

impl OperationTable {
    /// Register a barrier for `total` parties
    pub fn track(self: &Arc<Self>, total: usize) -> Arc<CompletionBarrier> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let table = Arc::downgrade(self);

        let barrier = Arc::new(CompletionBarrier::with_callback(move || {
            if let Some(table) = table.upgrade() {
                table.entries.lock().remove(&id);
            }
        }));

        self.entries.lock().insert(id, Arc::downgrade(&barrier));
        barrier.begin(total);
        barrier
    }

    /// Operations still running
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|barrier| barrier.strong_count() > 0)
            .count()
    }

    /// Parties still outstanding across all running operations
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .map(|barrier| barrier.pending_count())
            .sum()
    }
}
