//! Lazily-materialized, auto-reaped map.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A map that exists only while it holds entries.
///
/// The backing `HashMap` is allocated on the first insert and dropped as
/// soon as the last entry is removed. An atomic flag mirrors whether it is
/// materialized, so readers that find nothing take a lock-free fast path.
pub struct ReapingMap<K, V> {
    inner: Mutex<Option<HashMap<K, V>>>,
    materialized: AtomicBool,
}

impl<K: Eq + Hash, V> ReapingMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            materialized: AtomicBool::new(false),
        }
    }

    /// Whether the backing map currently exists.
    pub fn is_materialized(&self) -> bool {
        self.materialized.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        if !self.is_materialized() {
            return 0;
        }
        self.inner.lock().as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.with_item(key, |_| ()).is_some()
    }

    /// Runs `f` on the entry for `key`, if present.
    ///
    /// If `f` leaves a collection value empty it is not removed here; use
    /// [`update`](Self::update) for mutate-and-reap.
    pub fn with_item<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        if !self.is_materialized() {
            return None;
        }
        let mut guard = self.inner.lock();
        guard.as_mut()?.get_mut(key).map(f)
    }

    /// Inserts only if `key` is absent. Returns false if it was present.
    pub fn insert_new(&self, key: K, value: V) -> bool {
        let mut guard = self.inner.lock();
        let map = guard.get_or_insert_with(HashMap::new);
        self.materialized.store(true, Ordering::Release);
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Gets or creates the entry for `key`, then runs `f` on it.
    pub fn upsert<R>(&self, key: K, default: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut guard = self.inner.lock();
        let map = guard.get_or_insert_with(HashMap::new);
        self.materialized.store(true, Ordering::Release);
        f(map.entry(key).or_insert_with(default))
    }

    /// Runs `f` on the entry for `key`; removes the entry when `f` returns
    /// `true` for "now empty", reaping the map if it was the last one.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> (R, bool)) -> Option<R> {
        if !self.is_materialized() {
            return None;
        }
        let mut guard = self.inner.lock();
        let map = guard.as_mut()?;
        let (result, remove) = f(map.get_mut(key)?);
        if remove {
            map.remove(key);
            Self::reap(&mut guard, &self.materialized);
        }
        Some(result)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        if !self.is_materialized() {
            return None;
        }
        let mut guard = self.inner.lock();
        let value = guard.as_mut()?.remove(key);
        Self::reap(&mut guard, &self.materialized);
        value
    }

    /// Drops every entry and the backing map.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        *guard = None;
        self.materialized.store(false, Ordering::Release);
    }

    fn reap(slot: &mut Option<HashMap<K, V>>, flag: &AtomicBool) {
        if slot.as_ref().map(|m| m.is_empty()).unwrap_or(false) {
            *slot = None;
            flag.store(false, Ordering::Release);
        }
    }
}

impl<K: Eq + Hash + Clone, V> ReapingMap<K, V> {
    pub fn keys(&self) -> Vec<K> {
        if !self.is_materialized() {
            return Vec::new();
        }
        self.inner
            .lock()
            .as_ref()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl<K: Eq + Hash, V> Default for ReapingMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unmaterialized() {
        let map: ReapingMap<u32, String> = ReapingMap::new();
        assert!(!map.is_materialized());
        assert!(map.with_item(&1, |_| ()).is_none());
        assert!(map.remove(&1).is_none());
    }

    #[test]
    fn test_materializes_and_reaps() {
        let map = ReapingMap::new();
        assert!(map.insert_new(1, "a"));
        assert!(map.is_materialized());
        assert!(!map.insert_new(1, "b"));
        assert_eq!(map.with_item(&1, |v| *v), Some("a"));

        assert_eq!(map.remove(&1), Some("a"));
        assert!(!map.is_materialized());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_reaps_only_when_last_entry_removed() {
        let map = ReapingMap::new();
        map.insert_new(1, 10);
        map.insert_new(2, 20);
        map.remove(&1);
        assert!(map.is_materialized());
        map.remove(&2);
        assert!(!map.is_materialized());
    }

    #[test]
    fn test_update_can_reap() {
        let map: ReapingMap<u8, Vec<u8>> = ReapingMap::new();
        map.upsert(1, Vec::new, |v| v.push(5));
        let popped = map.update(&1, |v| {
            let x = v.pop();
            (x, v.is_empty())
        });
        assert_eq!(popped, Some(Some(5)));
        assert!(!map.is_materialized());
    }

    #[test]
    fn test_clear() {
        let map = ReapingMap::new();
        map.insert_new("x", 1);
        map.clear();
        assert!(!map.is_materialized());
        assert!(map.keys().is_empty());
    }
}
