//! Counting barrier for fan-out operations

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Callback = Box<dyn FnOnce() + Send>;

/// Tracks N outstanding parties and fires once when all have reported
///
/// Calling [`complete_one`](Self::complete_one) more often than the count given
/// to [`begin`](Self::begin) is harmless: the counter clamps at zero.
pub struct CompletionBarrier {
    pending: AtomicUsize,
    fired: AtomicBool,
    callback: Mutex<Option<Callback>>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl CompletionBarrier {
    /// Create a barrier with no completion callback
    pub fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            fired: AtomicBool::new(false),
            callback: Mutex::new(None),
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
        }
    }

    /// Create a barrier that runs `callback` exactly once on completion
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let barrier = Self::new();
        *barrier.callback.lock() = Some(Box::new(callback));
        barrier
    }

    /// Start tracking `total` parties; zero completes immediately
    pub fn begin(&self, total: usize) {
        self.pending.store(total, Ordering::SeqCst);
        if total == 0 {
            self.finish();
        }
    }

    /// Report one party done
    pub fn complete_one(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.finish();
        }
    }

    /// Finish now, regardless of what is still pending
    pub fn done(&self) {
        self.pending.store(0, Ordering::SeqCst);
        self.finish();
    }

    /// Parties that have not reported yet
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether completion has fired
    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Block until completion has fired
    pub fn wait(&self) {
        let mut finished = self.finished.lock();
        while !*finished {
            self.finished_cv.wait(&mut finished);
        }
    }

    fn finish(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }

        *self.finished.lock() = true;
        self.finished_cv.notify_all();
    }
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("pending", &self.pending_count())
            .field("finished", &self.is_finished())
            .finish()
    }
}
