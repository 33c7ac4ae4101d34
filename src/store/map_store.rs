//! This module provides an in-memory key-value store.

use std::collections::BTreeMap;

use crate::core::{KvStore, StoreError, StoreResult};

/// A key-value store that keeps every value in process memory.
///
/// ### Internal state
///
/// * `entries` — the key/value map. A `BTreeMap` gives deterministic iteration, so
///   `keys()` always returns keys in lexicographic order.
/// * `capacity` — optional limit, in bytes, on the sum of key and value lengths.
///   A `set` that would go past it fails with [`StoreError::CapacityExceeded`] and
///   leaves the previous value in place.
/// * `used` — current sum of key and value lengths.
///
/// ### Example
///
/// ```
/// use kv_vfs::{KvStore, MapStore};
///
/// let mut store = MapStore::with_capacity(16);
/// store.set("a", "hello").unwrap();
/// assert!(store.set("b", "far too long for the limit").is_err());
/// assert_eq!(store.get("a").unwrap().as_deref(), Some("hello"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct MapStore {
    entries: BTreeMap<String, String>,
    capacity: Option<usize>,
    used: usize,
}

impl MapStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `capacity` bytes of keys and values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Changes the limit. Existing data is kept even if it is already over the new limit.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Bytes currently used by keys and values.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MapStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let previous = self.entries.get(key).map_or(0, |v| key.len() + v.len());
        let next = self.used - previous + key.len() + value.len();
        if let Some(capacity) = self.capacity {
            if next > capacity {
                return Err(StoreError::CapacityExceeded);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.used = next;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        if let Some(value) = self.entries.remove(key) {
            self.used -= key.len() + value.len();
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}
