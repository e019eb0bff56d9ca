//! Concurrent hash map keyed by an arbitrary `Hash + Eq` key.
//!
//! Used by the thread pool to associate each worker's [`std::thread::ThreadId`]
//! with its local ring queue so other workers can enumerate and steal from
//! it. Buckets live behind an atomically-swappable `Arc`; within a bucket,
//! mutation is guarded by one of a fixed, striped array of shard locks, so
//! `grow` only ever needs to hold every shard lock at once, never a single
//! global lock on the hot path.

use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

const DEFAULT_INITIAL_BUCKETS: usize = 64;
const DEFAULT_MAX_BUCKETS: usize = 1024;

struct Entry<K, V> {
    key: K,
    value: V,
}

struct Buckets<K, V> {
    buckets: Vec<Mutex<Vec<Entry<K, V>>>>,
}

impl<K, V> Buckets<K, V> {
    fn new(n: usize) -> Self {
        let mut buckets = Vec::with_capacity(n);
        buckets.resize_with(n, || Mutex::new(Vec::new()));
        Self { buckets }
    }
}

/// A striped, growable concurrent hash map.
///
/// `get`/`set`/`erase` take a shard lock corresponding to the key's hashed
/// bucket index; `grow` takes every shard lock in ascending order (a fixed
/// global order, so it can never deadlock against a concurrent single-key
/// operation) and rehashes into a fresh, larger bucket vector, which is then
/// published via a swap of the `RwLock`-guarded `Arc`.
pub struct ShardedMap<K, V> {
    inner: RwLock<Arc<Buckets<K, V>>>,
    len: AtomicUsize,
    max_buckets: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> ShardedMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_BUCKETS, DEFAULT_MAX_BUCKETS)
    }

    pub fn with_capacity(initial_buckets: usize, max_buckets: usize) -> Self {
        let initial_buckets = initial_buckets.max(1);
        Self {
            inner: RwLock::new(Arc::new(Buckets::new(initial_buckets))),
            len: AtomicUsize::new(0),
            max_buckets: max_buckets.max(initial_buckets),
        }
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket_idx(hash: u64, n_buckets: usize) -> usize {
        (hash as usize) % n_buckets
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let buckets = Arc::clone(&self.inner.read().unwrap());
        let idx = Self::bucket_idx(Self::hash_of(key), buckets.buckets.len());
        let bucket = buckets.buckets[idx].lock();
        bucket.iter().find(|e| &e.key == key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let buckets = Arc::clone(&self.inner.read().unwrap());
        let n_buckets = buckets.buckets.len();
        let idx = Self::bucket_idx(Self::hash_of(&key), n_buckets);
        let mut grew = false;
        {
            let mut bucket = buckets.buckets[idx].lock();
            if let Some(entry) = bucket.iter_mut().find(|e| e.key == key) {
                entry.value = value.clone();
            } else {
                bucket.push(Entry { key: key.clone(), value: value.clone() });
                self.len.fetch_add(1, Ordering::Relaxed);
                // Trigger a grow once any single bucket's chain exceeds the
                // bucket count, mirroring the load-factor-1 threshold of the
                // dictionary this was grounded on.
                if bucket.len() > n_buckets && n_buckets < self.max_buckets {
                    grew = true;
                }
            }
        }
        if grew {
            self.grow();
        }
    }

    pub fn erase(&self, key: &K) -> Option<V> {
        let buckets = Arc::clone(&self.inner.read().unwrap());
        let idx = Self::bucket_idx(Self::hash_of(key), buckets.buckets.len());
        let mut bucket = buckets.buckets[idx].lock();
        if let Some(pos) = bucket.iter().position(|e| &e.key == key) {
            self.len.fetch_sub(1, Ordering::Relaxed);
            Some(bucket.remove(pos).value)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn grow(&self) {
        let mut guard = self.inner.write().unwrap();
        let old = Arc::clone(&guard);
        let new_n = (old.buckets.len() * 2).min(self.max_buckets);
        if new_n <= old.buckets.len() {
            return;
        }
        // Hold every shard lock (ascending order) only long enough to copy
        // entries out; this is the single global pause this map ever takes.
        let mut snapshot = Vec::new();
        for bucket in &old.buckets {
            let locked = bucket.lock();
            for entry in locked.iter() {
                snapshot.push((entry.key.clone(), entry.value.clone()));
            }
        }
        let fresh = Buckets::new(new_n);
        for (key, value) in snapshot {
            let idx = Self::bucket_idx(Self::hash_of(&key), new_n);
            fresh.buckets[idx].lock().push(Entry { key, value });
        }
        debug!(from = old.buckets.len(), to = new_n, "sharded map grew");
        *guard = Arc::new(fresh);
    }

    /// A point-in-time snapshot of every `(key, value)` pair, used by the
    /// pool to enumerate worker rings when stealing.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let buckets = Arc::clone(&self.inner.read().unwrap());
        let mut out = Vec::new();
        for bucket in &buckets.buckets {
            let locked = bucket.lock();
            out.extend(locked.iter().map(|e| (e.key.clone(), e.value.clone())));
        }
        out
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_get_erase_roundtrip() {
        let map: ShardedMap<String, i32> = ShardedMap::new();
        map.set("a".to_string(), 1);
        map.set("b".to_string(), 2);
        assert_eq!(map.get(&"a".to_string()), Some(1));
        assert_eq!(map.get(&"b".to_string()), Some(2));
        assert_eq!(map.get(&"c".to_string()), None);
        assert_eq!(map.erase(&"a".to_string()), Some(1));
        assert_eq!(map.get(&"a".to_string()), None);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let map: ShardedMap<u64, u64> = ShardedMap::with_capacity(4, 256);
        for i in 0..200 {
            map.set(i, i * 2);
        }
        for i in 0..200 {
            assert_eq!(map.get(&i), Some(i * 2));
        }
        assert_eq!(map.len(), 200);
    }

    #[test]
    fn concurrent_inserts_are_all_visible() {
        let map = Arc::new(ShardedMap::<u64, u64>::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..100u64 {
                        map.set(t * 100 + i, i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 800);
    }
}
