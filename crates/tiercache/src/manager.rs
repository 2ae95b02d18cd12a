//! CachesManager: policy-driven orchestration over an ordered backend list
//!
//! Later-added backends have higher priority. Each operation kind runs under
//! its own [`OperationPolicy`]; the manager stores nothing itself.

use bytes::Bytes;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::operations::OperationTable;
use crate::tiered::TieredCache;

/// How an operation is spread over the backends
///
/// Under every policy a backend that panics is treated as a miss and never
/// unwinds into the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPolicy {
    /// Highest to lowest priority, stopping at the first successful backend
    Serial,
    /// Every backend in parallel; completes once all have finished
    Concurrent,
    /// Only the most recently added backend
    HighestOnly,
    /// Only the first added backend
    LowestOnly,
}

/// Operation kinds with independently configurable policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `data`, `extended_data`
    Query,
    /// `set_data`, `set_extended_data`
    Store,
    /// `remove`
    Remove,
    /// `contains`
    Contains,
    /// `remove_all`, `remove_expired`
    Clear,
}

/// Policy per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPolicies {
    /// Defaults to [`OperationPolicy::Serial`]
    pub query: OperationPolicy,
    /// Defaults to [`OperationPolicy::HighestOnly`]
    pub store: OperationPolicy,
    /// Defaults to [`OperationPolicy::Concurrent`]
    pub remove: OperationPolicy,
    /// Defaults to [`OperationPolicy::Serial`]
    pub contains: OperationPolicy,
    /// Defaults to [`OperationPolicy::Concurrent`]
    pub clear: OperationPolicy,
}

impl Default for OperationPolicies {
    fn default() -> Self {
        Self {
            query: OperationPolicy::Serial,
            store: OperationPolicy::HighestOnly,
            remove: OperationPolicy::Concurrent,
            contains: OperationPolicy::Serial,
            clear: OperationPolicy::Concurrent,
        }
    }
}

impl OperationPolicies {
    /// Policy for `kind`
    pub fn get(&self, kind: OperationKind) -> OperationPolicy {
        match kind {
            OperationKind::Query => self.query,
            OperationKind::Store => self.store,
            OperationKind::Remove => self.remove,
            OperationKind::Contains => self.contains,
            OperationKind::Clear => self.clear,
        }
    }

    /// Set the policy for `kind`
    pub fn set(&mut self, kind: OperationKind, policy: OperationPolicy) {
        match kind {
            OperationKind::Query => self.query = policy,
            OperationKind::Store => self.store = policy,
            OperationKind::Remove => self.remove = policy,
            OperationKind::Contains => self.contains = policy,
            OperationKind::Clear => self.clear = policy,
        }
    }
}

type Backends = Arc<Vec<Arc<dyn Cache>>>;

/// Run `op` on one backend, turning a panic into `None`
fn call_isolated<R, F>(kind: OperationKind, backend: &dyn Cache, op: &F) -> Option<R>
where
    F: Fn(&dyn Cache) -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(|| op(backend))) {
        Ok(result) => Some(result),
        Err(_) => {
            warn!(?kind, "Cache backend panicked");
            None
        }
    }
}

fn same_backend(a: &Arc<dyn Cache>, b: &Arc<dyn Cache>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Orchestrates an ordered list of cache backends
///
/// Usable anywhere a [`Cache`] is expected. With no backends every lookup
/// misses and every mutation is a no-op.
pub struct CachesManager {
    backends: RwLock<Backends>,
    policies: RwLock<OperationPolicies>,
    operations: Arc<OperationTable>,
}

impl CachesManager {
    /// Create a manager with no backends and default policies
    pub fn new() -> Self {
        Self::with_policies(OperationPolicies::default())
    }

    /// Create a manager with no backends and the given policies
    pub fn with_policies(policies: OperationPolicies) -> Self {
        Self {
            backends: RwLock::new(Arc::new(Vec::new())),
            policies: RwLock::new(policies),
            operations: Arc::new(OperationTable::default()),
        }
    }

    /// Process-wide manager holding [`TieredCache::shared`]
    pub fn shared() -> Arc<CachesManager> {
        static SHARED: OnceLock<Arc<CachesManager>> = OnceLock::new();

        SHARED
            .get_or_init(|| {
                let manager = CachesManager::new();
                if let Some(cache) = TieredCache::shared() {
                    manager.add_backend(cache);
                }
                Arc::new(manager)
            })
            .clone()
    }

    /// Append a backend, giving it the highest priority
    pub fn add_backend(&self, backend: Arc<dyn Cache>) {
        let mut backends = self.backends.write();
        let mut next = Vec::clone(&backends);
        next.push(backend);
        *backends = Arc::new(next);
    }

    /// Remove a backend; returns whether it was present
    pub fn remove_backend(&self, backend: &Arc<dyn Cache>) -> bool {
        let mut backends = self.backends.write();
        let before = backends.len();
        let next: Vec<_> = backends
            .iter()
            .filter(|b| !same_backend(b, backend))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *backends = Arc::new(next);
        removed
    }

    /// Replace the whole backend list, lowest priority first
    pub fn set_backends(&self, backends: Vec<Arc<dyn Cache>>) {
        *self.backends.write() = Arc::new(backends);
    }

    /// Snapshot of the backend list, lowest priority first
    pub fn backends(&self) -> Vec<Arc<dyn Cache>> {
        Vec::clone(&self.snapshot())
    }

    /// Number of backends
    pub fn backend_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Current policy for `kind`
    pub fn policy(&self, kind: OperationKind) -> OperationPolicy {
        self.policies.read().get(kind)
    }

    /// Change the policy for `kind`
    pub fn set_policy(&self, kind: OperationKind, policy: OperationPolicy) {
        self.policies.write().set(kind, policy);
    }

    /// All current policies
    pub fn policies(&self) -> OperationPolicies {
        *self.policies.read()
    }

    /// Concurrent fan-outs currently running
    pub fn in_flight_operations(&self) -> usize {
        self.operations.len()
    }

    /// Backends still working across all running fan-outs
    pub fn pending_backend_calls(&self) -> usize {
        self.operations.pending()
    }

    // Writers swap in a new list, so a fan-out keeps the list it started with
    fn snapshot(&self) -> Backends {
        Arc::clone(&self.backends.read())
    }

    /// Run `op` under the policy for `kind`
    ///
    /// Returns the highest-priority result accepted by `hit`, if any. A
    /// backend that panics counts as a miss under every policy.
    fn dispatch<R, F, H>(&self, kind: OperationKind, op: F, hit: H) -> Option<R>
    where
        R: Send,
        F: Fn(&dyn Cache) -> R + Sync,
        H: Fn(&R) -> bool,
    {
        let backends = self.snapshot();
        let policy = self.policy(kind);

        match policy {
            OperationPolicy::Serial => backends
                .iter()
                .rev()
                .filter_map(|backend| call_isolated(kind, backend.as_ref(), &op))
                .find(|result| hit(result)),
            OperationPolicy::HighestOnly => backends
                .last()
                .and_then(|backend| call_isolated(kind, backend.as_ref(), &op))
                .filter(|result| hit(result)),
            OperationPolicy::LowestOnly => backends
                .first()
                .and_then(|backend| call_isolated(kind, backend.as_ref(), &op))
                .filter(|result| hit(result)),
            OperationPolicy::Concurrent => self
                .fan_out(kind, &backends, &op)
                .into_iter()
                .rev()
                .flatten()
                .find(|result| hit(result)),
        }
    }

    /// Call `op` on every backend in parallel and wait for all of them
    ///
    /// Results are in list order; a backend that panicked yields `None`.
    fn fan_out<R, F>(
        &self,
        kind: OperationKind,
        backends: &[Arc<dyn Cache>],
        op: &F,
    ) -> Vec<Option<R>>
    where
        R: Send,
        F: Fn(&dyn Cache) -> R + Sync,
    {
        let barrier = self.operations.track(backends.len());

        let results = thread::scope(|scope| {
            let handles: Vec<_> = backends
                .iter()
                .map(|backend| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let result = op(backend.as_ref());
                        barrier.complete_one();
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => Some(result),
                    Err(_) => {
                        warn!(?kind, "Cache backend panicked during fan-out");
                        None
                    }
                })
                .collect::<Vec<_>>()
        });

        // Every thread has been joined; release parties that never reported
        barrier.done();
        debug!(?kind, backends = backends.len(), "Fan-out finished");
        results
    }
}

impl Default for CachesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for CachesManager {
    fn contains(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        self.dispatch(OperationKind::Contains, |c| c.contains(key), |found| *found)
            .unwrap_or(false)
    }

    fn data(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        self.dispatch(OperationKind::Query, |c| c.data(key), Option::is_some)
            .flatten()
    }

    fn set_data(&self, key: &str, data: Bytes) -> bool {
        if key.is_empty() {
            return false;
        }
        self.dispatch(
            OperationKind::Store,
            |c| c.set_data(key, data.clone()),
            |stored| *stored,
        )
        .unwrap_or(false)
    }

    fn extended_data(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        self.dispatch(OperationKind::Query, |c| c.extended_data(key), Option::is_some)
            .flatten()
    }

    fn set_extended_data(&self, key: &str, data: Option<Bytes>) -> bool {
        if key.is_empty() {
            return false;
        }
        self.dispatch(
            OperationKind::Store,
            |c| c.set_extended_data(key, data.clone()),
            |stored| *stored,
        )
        .unwrap_or(false)
    }

    fn remove(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.dispatch(OperationKind::Remove, |c| c.remove(key), |_| false);
    }

    fn remove_all(&self) {
        self.dispatch(OperationKind::Clear, |c| c.remove_all(), |_| false);
    }

    fn remove_expired(&self) {
        self.dispatch(OperationKind::Clear, |c| c.remove_expired(), |_| false);
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() {
            return None;
        }
        self.snapshot()
            .iter()
            .rev()
            .find_map(|backend| backend.cache_path(key))
    }

    fn total_count(&self) -> u64 {
        self.snapshot().iter().map(|b| b.total_count()).sum()
    }

    fn total_size(&self) -> u64 {
        self.snapshot().iter().map(|b| b.total_size()).sum()
    }
}

async fn run_blocking<R, F>(op: &'static str, job: F) -> Option<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(op, error = %e, "Blocking cache task failed");
            None
        }
    }
}

/// Async wrappers running the blocking operations on tokio's blocking pool
impl CachesManager {
    /// Async [`Cache::data`]
    pub async fn query_async(self: &Arc<Self>, key: &str) -> Option<Bytes> {
        let manager = Arc::clone(self);
        let key = key.to_string();
        run_blocking("query", move || manager.data(&key))
            .await
            .flatten()
    }

    /// Async [`Cache::set_data`]
    pub async fn store_async(self: &Arc<Self>, key: &str, data: Bytes) -> bool {
        let manager = Arc::clone(self);
        let key = key.to_string();
        run_blocking("store", move || manager.set_data(&key, data))
            .await
            .unwrap_or(false)
    }

    /// Async [`Cache::remove`]
    pub async fn remove_async(self: &Arc<Self>, key: &str) {
        let manager = Arc::clone(self);
        let key = key.to_string();
        run_blocking("remove", move || manager.remove(&key)).await;
    }

    /// Async [`Cache::contains`]
    pub async fn contains_async(self: &Arc<Self>, key: &str) -> bool {
        let manager = Arc::clone(self);
        let key = key.to_string();
        run_blocking("contains", move || manager.contains(&key))
            .await
            .unwrap_or(false)
    }

    /// Async [`Cache::remove_all`]
    pub async fn clear_async(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        run_blocking("clear", move || manager.remove_all()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    fn memory() -> Arc<MemoryCache> {
        Arc::new(MemoryCache::default())
    }

    /// Two memory backends: `low` added first, `high` second
    fn pair() -> (CachesManager, Arc<MemoryCache>, Arc<MemoryCache>) {
        let manager = CachesManager::new();
        let low = memory();
        let high = memory();
        manager.add_backend(low.clone());
        manager.add_backend(high.clone());
        (manager, low, high)
    }

    /// Backend that records calls and can be slowed down or broken
    #[derive(Default)]
    struct Probe {
        queries: AtomicUsize,
        removed: AtomicBool,
        delay: Duration,
        panics: bool,
    }

    impl Cache for Probe {
        fn contains(&self, _key: &str) -> bool {
            false
        }
        fn data(&self, _key: &str) -> Option<Bytes> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("backend failure");
            }
            None
        }
        fn set_data(&self, _key: &str, _data: Bytes) -> bool {
            false
        }
        fn extended_data(&self, _key: &str) -> Option<Bytes> {
            None
        }
        fn set_extended_data(&self, _key: &str, _data: Option<Bytes>) -> bool {
            false
        }
        fn remove(&self, _key: &str) {
            if self.panics {
                panic!("backend failure");
            }
            thread::sleep(self.delay);
            self.removed.store(true, Ordering::SeqCst);
        }
        fn remove_all(&self) {}
        fn remove_expired(&self) {}
        fn cache_path(&self, _key: &str) -> Option<PathBuf> {
            None
        }
        fn total_count(&self) -> u64 {
            0
        }
        fn total_size(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_default_policies() {
        let manager = CachesManager::new();

        assert_eq!(manager.policy(OperationKind::Query), OperationPolicy::Serial);
        assert_eq!(manager.policy(OperationKind::Store), OperationPolicy::HighestOnly);
        assert_eq!(manager.policy(OperationKind::Remove), OperationPolicy::Concurrent);
        assert_eq!(manager.policy(OperationKind::Contains), OperationPolicy::Serial);
        assert_eq!(manager.policy(OperationKind::Clear), OperationPolicy::Concurrent);
    }

    #[test]
    fn test_no_backends() {
        let manager = CachesManager::new();

        assert_eq!(manager.data("k"), None);
        assert!(!manager.contains("k"));
        assert!(!manager.set_data("k", bytes("v")));
        manager.remove("k");
        manager.remove_all();
        assert_eq!(manager.total_count(), 0);
        assert_eq!(manager.in_flight_operations(), 0);
    }

    #[test]
    fn test_serial_query_falls_through_to_lower() {
        let (manager, low, high) = pair();
        low.set("x", bytes("from-low"));

        assert_eq!(manager.data("x"), Some(bytes("from-low")));
        assert_eq!(high.stats().misses(), 1);
        assert_eq!(low.stats().hits(), 1);
    }

    #[test]
    fn test_serial_query_stops_at_first_hit() {
        let (manager, low, high) = pair();
        low.set("x", bytes("low"));
        high.set("x", bytes("high"));

        assert_eq!(manager.data("x"), Some(bytes("high")));
        assert_eq!(low.stats().hits() + low.stats().misses(), 0);
    }

    #[test]
    fn test_highest_only_store() {
        let (manager, low, high) = pair();

        assert!(manager.set_data("y", bytes("data")));
        assert!(high.contains("y"));
        assert!(!low.contains("y"));
    }

    #[test]
    fn test_lowest_only_store() {
        let (manager, low, high) = pair();
        manager.set_policy(OperationKind::Store, OperationPolicy::LowestOnly);

        manager.set_data("y", bytes("data"));
        assert!(low.contains("y"));
        assert!(!high.contains("y"));
    }

    #[test]
    fn test_serial_store_falls_back_when_refused() {
        let manager = CachesManager::new();
        let low = memory();
        let tiny = Arc::new(MemoryCache::new(None, Some(1)));
        manager.add_backend(low.clone());
        manager.add_backend(tiny.clone());
        manager.set_policy(OperationKind::Store, OperationPolicy::Serial);

        assert!(manager.set_data("k", bytes("too big")));
        assert!(!tiny.contains("k"));
        assert!(low.contains("k"));
    }

    #[test]
    fn test_concurrent_store_writes_everywhere() {
        let (manager, low, high) = pair();
        manager.set_policy(OperationKind::Store, OperationPolicy::Concurrent);

        assert!(manager.set_data("k", bytes("v")));
        assert!(low.contains("k"));
        assert!(high.contains("k"));
    }

    #[test]
    fn test_concurrent_query_touches_every_backend() {
        let manager = CachesManager::new();
        let low = memory();
        let probe = Arc::new(Probe::default());
        manager.add_backend(low.clone());
        manager.add_backend(probe.clone());
        manager.set_policy(OperationKind::Query, OperationPolicy::Concurrent);
        low.set("k", bytes("v"));

        assert_eq!(manager.data("k"), Some(bytes("v")));
        assert_eq!(probe.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_query_prefers_higher_priority() {
        let (manager, low, high) = pair();
        manager.set_policy(OperationKind::Query, OperationPolicy::Concurrent);
        low.set("k", bytes("low"));
        high.set("k", bytes("high"));

        assert_eq!(manager.data("k"), Some(bytes("high")));
        assert_eq!(low.stats().hits(), 1);
    }

    #[test]
    fn test_concurrent_remove_waits_for_all() {
        let manager = CachesManager::new();
        let slow = Arc::new(Probe {
            delay: Duration::from_millis(50),
            ..Probe::default()
        });
        let fast = Arc::new(Probe::default());
        manager.add_backend(slow.clone());
        manager.add_backend(fast.clone());

        manager.remove("z");

        assert!(slow.removed.load(Ordering::SeqCst));
        assert!(fast.removed.load(Ordering::SeqCst));
        assert_eq!(manager.in_flight_operations(), 0);
    }

    #[test]
    fn test_panicking_backend_does_not_abort_fan_out() {
        let manager = CachesManager::new();
        let healthy = Arc::new(Probe::default());
        let broken = Arc::new(Probe {
            panics: true,
            ..Probe::default()
        });
        manager.add_backend(healthy.clone());
        manager.add_backend(broken);

        manager.remove("k");

        assert!(healthy.removed.load(Ordering::SeqCst));
        assert_eq!(manager.in_flight_operations(), 0);
    }

    #[test]
    fn test_panicking_backend_is_a_miss_under_every_policy() {
        let manager = CachesManager::new();
        let low = memory();
        let broken = Arc::new(Probe {
            panics: true,
            ..Probe::default()
        });
        manager.add_backend(low.clone());
        manager.add_backend(broken.clone());
        low.set("k", bytes("v"));

        // Serial skips the broken backend and keeps going
        assert_eq!(manager.data("k"), Some(bytes("v")));

        manager.set_policy(OperationKind::Query, OperationPolicy::HighestOnly);
        assert_eq!(manager.data("k"), None);

        manager.set_policy(OperationKind::Remove, OperationPolicy::HighestOnly);
        manager.remove("k");
        assert!(low.contains("k"));

        manager.set_policy(OperationKind::Query, OperationPolicy::LowestOnly);
        assert_eq!(manager.data("k"), Some(bytes("v")));

        assert_eq!(broken.queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_and_clear_reach_every_backend() {
        let (manager, low, high) = pair();
        low.set("a", bytes("1"));
        high.set("a", bytes("1"));
        low.set("b", bytes("2"));

        manager.remove("a");
        assert!(!low.contains("a"));
        assert!(!high.contains("a"));

        manager.remove_all();
        assert!(low.is_empty());
        assert!(high.is_empty());
    }

    #[test]
    fn test_serial_contains() {
        let (manager, low, _high) = pair();
        low.set("k", bytes("v"));

        assert!(manager.contains("k"));
        assert!(!manager.contains("other"));

        manager.set_policy(OperationKind::Contains, OperationPolicy::HighestOnly);
        assert!(!manager.contains("k"));
    }

    #[test]
    fn test_extended_data_routing() {
        let (manager, low, high) = pair();
        low.set("k", bytes("v"));

        // Store goes to the highest backend only, which has no entry
        assert!(!manager.set_extended_data("k", Some(bytes("meta"))));

        low.set_extended("k", Some(bytes("meta")));
        assert_eq!(manager.extended_data("k"), Some(bytes("meta")));
        assert!(!high.contains("k"));
    }

    #[test]
    fn test_add_and_remove_backend() {
        let manager = CachesManager::new();
        let a: Arc<dyn Cache> = memory();
        let b: Arc<dyn Cache> = memory();
        manager.add_backend(a.clone());
        manager.add_backend(b.clone());

        assert_eq!(manager.backend_count(), 2);
        assert!(manager.remove_backend(&a));
        assert!(!manager.remove_backend(&a));
        assert_eq!(manager.backend_count(), 1);
        assert!(same_backend(&manager.backends()[0], &b));
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let (manager, _low, _high) = pair();
        let snapshot = manager.snapshot();

        manager.set_backends(Vec::new());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(manager.backend_count(), 0);
    }

    #[test]
    fn test_totals_sum_backends() {
        let (manager, low, high) = pair();
        low.set("a", bytes("123"));
        high.set("b", bytes("12"));

        assert_eq!(manager.total_count(), 2);
        assert_eq!(manager.total_size(), 5);
    }

    #[test]
    fn test_manager_as_backend() {
        let (inner, low, _high) = pair();
        let outer = CachesManager::new();
        outer.add_backend(Arc::new(inner));
        low.set("k", bytes("nested"));

        assert_eq!(outer.data("k"), Some(bytes("nested")));
    }

    #[test]
    fn test_shared_is_single_instance() {
        assert!(Arc::ptr_eq(&CachesManager::shared(), &CachesManager::shared()));
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let (manager, low, high) = pair();
        let manager = Arc::new(manager);

        assert!(manager.store_async("k", bytes("v")).await);
        assert!(high.contains("k"));
        assert!(manager.contains_async("k").await);
        assert_eq!(manager.query_async("k").await, Some(bytes("v")));

        low.set("k", bytes("v"));
        manager.remove_async("k").await;
        assert!(!low.contains("k"));
        assert!(!high.contains("k"));

        high.set("x", bytes("1"));
        manager.clear_async().await;
        assert!(high.is_empty());
    }
}
