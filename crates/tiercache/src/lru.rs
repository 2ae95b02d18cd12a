//! Cost-weighted LRU (Least Recently Used) list
//!
//! Uses an intrusive doubly-linked list over a slab for O(1) promotion and
//! eviction. Every entry carries a cost; the list is bounded by an optional
//! entry count and an optional total cost.

use ahash::RandomState;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    cost: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU list bounded by count and total cost
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    count_limit: Option<usize>,
    cost_limit: Option<u64>,
    total_cost: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU list; `None` means unlimited
    pub fn new(count_limit: Option<usize>, cost_limit: Option<u64>) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            count_limit,
            cost_limit,
            total_cost: 0,
        }
    }

    /// Get a value and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Get a mutable value without changing its position
    pub fn peek_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_mut().map(|node| &mut node.value)
    }

    /// Check for a key without changing its position
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert or replace a value, evicting from the tail until within limits
    ///
    /// Returns the number of evicted entries, or `None` if the entry was
    /// rejected because it alone exceeds a limit. A rejected insert leaves the
    /// list untouched, including any previous value for `key`.
    pub fn put(&mut self, key: K, value: V, cost: u64) -> Option<usize> {
        if self.cost_limit.is_some_and(|limit| cost > limit) || self.count_limit == Some(0) {
            // A rejected replacement must not leave the old value readable
            self.remove(&key);
            return None;
        }

        if let Some(&idx) = self.map.get(&key) {
            // Update existing
            if let Some(node) = &mut self.nodes[idx] {
                self.total_cost = self.total_cost - node.cost + cost;
                node.value = value;
                node.cost = cost;
            }
            self.move_to_front(idx);
        } else {
            let idx = self.alloc_node();
            self.nodes[idx] = Some(Node {
                key: key.clone(),
                value,
                cost,
                prev: None,
                next: self.head,
            });

            if let Some(head_idx) = self.head {
                if let Some(head) = &mut self.nodes[head_idx] {
                    head.prev = Some(idx);
                }
            }

            self.head = Some(idx);
            if self.tail.is_none() {
                self.tail = Some(idx);
            }

            self.total_cost += cost;
            self.map.insert(key, idx);
        }

        Some(self.evict_to_limits())
    }

    /// Remove a key from the list
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free_list.push(idx);
        self.total_cost -= node.cost;
        Some(node.value)
    }

    /// Change the limits, evicting as needed; returns evicted count
    pub fn set_limits(&mut self, count_limit: Option<usize>, cost_limit: Option<u64>) -> usize {
        self.count_limit = count_limit;
        self.cost_limit = cost_limit;
        if count_limit == Some(0) {
            let evicted = self.len();
            self.clear();
            return evicted;
        }
        self.evict_to_limits()
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of all entry costs
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Count limit, if any
    pub fn count_limit(&self) -> Option<usize> {
        self.count_limit
    }

    /// Cost limit, if any
    pub fn cost_limit(&self) -> Option<u64> {
        self.cost_limit
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match &self.nodes[idx] {
                Some(node) => {
                    keys.push(&node.key);
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    /// Clear the list
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.total_cost = 0;
    }

    fn over_limits(&self) -> bool {
        self.count_limit.is_some_and(|limit| self.len() > limit)
            || self.cost_limit.is_some_and(|limit| self.total_cost > limit)
    }

    fn evict_to_limits(&mut self) -> usize {
        let mut evicted = 0;
        // Never evict the head: it was just touched and fits on its own
        while self.over_limits() && self.tail.is_some() && self.tail != self.head {
            self.evict();
            evicted += 1;
        }
        evicted
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return; // Already at front
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn evict(&mut self) {
        if let Some(tail_idx) = self.tail {
            self.unlink(tail_idx);
            if let Some(node) = self.nodes[tail_idx].take() {
                self.map.remove(&node.key);
                self.total_cost -= node.cost;
            }
            self.free_list.push(tail_idx);
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }
}
