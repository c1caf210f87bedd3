//! # Bounded LRU Cache
//!
//! Small least-recently-used map shared by the feature aggregator and the
//! per-algorithm score cache. Every cache in the engine has an explicit
//! capacity; inserting past it evicts the entry that was touched longest ago.
//!
//! Recency is tracked with a monotonically increasing tick. The tick → key
//! index lives in a `BTreeMap`, so eviction and touch are `O(log n)`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    tick: u64,
}

/// Least-recently-used map with a fixed capacity.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    evictions: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `key`, marking it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, key.clone());
        Some(&slot.value)
    }

    /// Look up `key` without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace `key`. Returns the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(&key) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            slot.value = value;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(tick, key.clone());
        self.entries.insert(key, Slot { value, tick });
        evicted
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (&oldest_tick, _) = self.order.iter().next()?;
        let key = self.order.remove(&oldest_tick)?;
        let slot = self.entries.remove(&key)?;
        self.evictions += 1;
        Some((key, slot.value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    /// Drop every entry for which `keep` returns false. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let doomed: Vec<(K, u64)> = self
            .entries
            .iter()
            .filter(|(key, slot)| !keep(key, &slot.value))
            .map(|(key, slot)| (key.clone(), slot.tick))
            .collect();

        for (key, tick) in &doomed {
            self.entries.remove(key);
            self.order.remove(tick);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, slot)| (key, &slot.value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of capacity evictions since creation.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}
