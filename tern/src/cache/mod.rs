//! Memoization caches for step propagation results.
//!
//! Identical mask-pair queries recur across rounds and across search
//! branches, so both step kinds memoize their propagation results. A cache
//! instance is shared per layer *kind* (same S-box, same linear function),
//! never per round. Since cloned branches may be explored from different
//! worker threads, the shared front is sharded behind mutexes; the stores
//! themselves are pure memoization, so sharing them across branches is
//! always sound.

use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::{Arc, Mutex};

use ahash::AHasher;

const SHARD_COUNT: usize = 8;

/// Bounded key -> value store with least-recently-used eviction.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, Slot<V>, BuildHasherDefault<AHasher>>,
    /// Recency queue. Stale entries (stamp no longer matching the map's)
    /// are skipped during eviction and squeezed out on compaction.
    queue: VecDeque<(K, u64)>,
    stamp: u64,
    capacity: usize,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> LruCache<K, V> {
        assert!(capacity >= 1, "LRU cache needs a capacity of at least 1");
        LruCache {
            map: Default::default(),
            queue: VecDeque::new(),
            stamp: 0,
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Look up `key`. A hit refreshes the entry's recency.
    pub fn find(&mut self, key: &K) -> Option<V> {
        self.stamp += 1;
        let stamp = self.stamp;
        let hit = match self.map.get_mut(key) {
            Some(slot) => {
                slot.stamp = stamp;
                Some(slot.value.clone())
            }
            None => None,
        };
        if hit.is_some() {
            self.queue.push_back((key.clone(), stamp));
            self.maybe_compact();
        }
        hit
    }

    /// Insert `value` under `key`, evicting the least-recently-used entry
    /// if the cache is at capacity. Re-inserting an existing key refreshes
    /// it instead.
    pub fn insert(&mut self, key: K, value: V) {
        self.stamp += 1;
        let stamp = self.stamp;
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict_one();
        }
        self.map.insert(key.clone(), Slot { value, stamp });
        self.queue.push_back((key, stamp));
        self.maybe_compact();
    }

    fn evict_one(&mut self) {
        while let Some((key, stamp)) = self.queue.pop_front() {
            let live = match self.map.get(&key) {
                Some(slot) => slot.stamp == stamp,
                None => false,
            };
            if live {
                self.map.remove(&key);
                return;
            }
        }
    }

    /// The queue accumulates one entry per touch; drop the stale ones once
    /// it outgrows the map by enough to matter.
    fn maybe_compact(&mut self) {
        if self.queue.len() <= 4 * self.capacity {
            return;
        }
        let map = &self.map;
        self.queue.retain(|(key, stamp)| match map.get(key) {
            Some(slot) => slot.stamp == *stamp,
            None => false,
        });
    }
}

/// Thread-safe sharded front over [`LruCache`], shared between all clones
/// of a permutation. Cloning shares the underlying store.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    shards: Arc<Vec<Mutex<LruCache<K, V>>>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        SharedCache {
            shards: Arc::clone(&self.shards),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> SharedCache<K, V> {
        let per_shard = (capacity / SHARD_COUNT).max(1);
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();
        SharedCache {
            shards: Arc::new(shards),
        }
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let mut shard = self.shards[self.shard_index(key)]
            .lock()
            .expect("Cache shard poisoned");
        shard.find(key)
    }

    pub fn insert(&self, key: K, value: V) {
        let index = self.shard_index(&key);
        let mut shard = self.shards[index].lock().expect("Cache shard poisoned");
        shard.insert(key, value);
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }
}
