use std::collections::HashMap;
use std::hash::Hash;

/// Fixed-capacity memo table that forgets everything once full.
///
/// Recomputing a level or experience value is cheap, so a full clear is
/// preferred over tracking recency.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    capacity: usize,
    clears: u64,
}

impl<K: Hash + Eq, V: Copy> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            clears: 0,
        }
    }

    /// Look up a memoized value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).copied()
    }

    /// Store a value, clearing the table first when it is full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.clear();
            self.clears += 1;
        }
        self.entries.insert(key, value);
    }

    /// Return the cached value or compute and store it.
    pub fn get_or_insert_with(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value);
        value
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times the table has been wiped for being full.
    pub fn clears(&self) -> u64 {
        self.clears
    }
}
