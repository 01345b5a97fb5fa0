//! Keyed cache that tracks changes against its last synchronized baseline.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use uop_core::{field_diff, FieldChanges, UopResult};

/// Pending changes of a [`SnapshotCache`] relative to its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDiff<K: Eq + Hash, V> {
    /// Keys with a current value but no baseline value.
    pub inserted: HashMap<K, V>,
    /// Keys present in both with at least one differing field.
    pub modified: HashMap<K, FieldChanges>,
    /// Keys with a baseline value but no current value (baseline values).
    pub deleted: HashMap<K, V>,
}

impl<K: Eq + Hash, V> CacheDiff<K, V> {
    /// True when nothing was inserted, modified or deleted.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed keys.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.modified.len() + self.deleted.len()
    }
}

impl<K: Eq + Hash, V> Default for CacheDiff<K, V> {
    fn default() -> Self {
        Self {
            inserted: HashMap::new(),
            modified: HashMap::new(),
            deleted: HashMap::new(),
        }
    }
}

/// A keyed cache remembering the value each key had at the last
/// synchronization point.
///
/// Current and original values are tracked independently: `set` and
/// `delete` only touch the current side, and only [`synchronize`] moves the
/// baseline forward.
///
/// [`synchronize`]: SnapshotCache::synchronize
#[derive(Debug, Clone)]
pub struct SnapshotCache<K, V> {
    current: HashMap<K, V>,
    original: HashMap<K, V>,
}

impl<K, V> Default for SnapshotCache<K, V> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            original: HashMap::new(),
        }
    }
}

impl<K, V> SnapshotCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq + Serialize,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as both baseline and current value, unless the key is
    /// already tracked. Fresh store state never clobbers in-flight edits or
    /// pending deletes.
    pub fn load_original(&mut self, key: K, value: V) {
        if self.current.contains_key(&key) || self.original.contains_key(&key) {
            return;
        }
        self.original.insert(key.clone(), value.clone());
        self.current.insert(key, value);
    }

    /// Load many baseline entries.
    pub fn load_originals(&mut self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.load_original(key, value);
        }
    }

    /// Set the current value of `key`.
    pub fn set(&mut self, key: K, value: V) {
        self.current.insert(key, value);
    }

    /// Current value of `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.current.get(key)
    }

    /// Mutable access to the current value of `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.current.get_mut(key)
    }

    /// Baseline value of `key`.
    pub fn original(&self, key: &K) -> Option<&V> {
        self.original.get(key)
    }

    /// Remove the current value of `key`. The baseline stays, so the removal
    /// shows up as a delete until the next synchronization.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.current.remove(key)
    }

    /// Forget `key` on both sides, as if it had never been loaded.
    pub fn forget(&mut self, key: &K) {
        self.current.remove(key);
        self.original.remove(key);
    }

    /// Whether `key` has a current value.
    pub fn contains(&self, key: &K) -> bool {
        self.current.contains_key(key)
    }

    /// Whether `key` has a baseline value (i.e. it is known to be persisted).
    pub fn is_original(&self, key: &K) -> bool {
        self.original.contains_key(key)
    }

    /// Whether `key` is tracked on either side.
    pub fn is_known(&self, key: &K) -> bool {
        self.current.contains_key(key) || self.original.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.current.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.current.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.current.iter()
    }

    /// Number of current values.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// True if any key was added, removed, or has a differing field.
    pub fn has_changes(&self) -> bool {
        if self.current.keys().any(|k| !self.original.contains_key(k)) {
            return true;
        }
        if self.original.keys().any(|k| !self.current.contains_key(k)) {
            return true;
        }
        self.original.iter().any(|(key, before)| match self.current.get(key) {
            Some(now) if now != before => field_diff(before, now)
                .map(|changes| !changes.is_empty())
                .unwrap_or(true),
            _ => false,
        })
    }

    /// Compute pending changes against the baseline. Does not modify the cache.
    pub fn compute_diff(&self) -> UopResult<CacheDiff<K, V>> {
        let mut diff = CacheDiff::default();

        for (key, value) in &self.current {
            match self.original.get(key) {
                None => {
                    diff.inserted.insert(key.clone(), value.clone());
                }
                Some(before) if before != value => {
                    let changes = field_diff(before, value)?;
                    if !changes.is_empty() {
                        diff.modified.insert(key.clone(), changes);
                    }
                }
                Some(_) => {}
            }
        }
        for (key, value) in &self.original {
            if !self.current.contains_key(key) {
                diff.deleted.insert(key.clone(), value.clone());
            }
        }

        Ok(diff)
    }

    /// Advance the baseline to the current state.
    pub fn synchronize(&mut self) {
        self.original = self.current.clone();
    }

    /// Drop everything, baseline included.
    pub fn clear(&mut self) {
        self.current.clear();
        self.original.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
