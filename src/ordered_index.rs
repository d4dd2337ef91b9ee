//! Ordered key index backed by a skiplist for O(log n) operations
//! Authoritative lookup behind the direct-mapped fast path

use crossbeam_skiplist::SkipMap;

/// Key-ordered map from page number to an opaque value
pub struct OrderedIndex<V> {
    map: SkipMap<u64, V>,
}

impl<V> OrderedIndex<V>
where
    V: Copy + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }

    /// Insert or replace the value stored under `key`
    pub fn set(&self, key: u64, value: V) {
        self.map.insert(key, value);
    }

    pub fn search(&self, key: u64) -> Option<V> {
        self.map.get(&key).map(|entry| *entry.value())
    }

    /// Remove `key`, returning the value it held
    pub fn remove(&self, key: u64) -> Option<V> {
        self.map.remove(&key).map(|entry| *entry.value())
    }

    pub fn contains(&self, key: u64) -> bool {
        self.map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn first(&self) -> Option<u64> {
        self.map.front().map(|entry| *entry.key())
    }

    pub fn last(&self) -> Option<u64> {
        self.map.back().map(|entry| *entry.key())
    }

    /// All keys in ascending order
    pub fn keys(&self) -> Vec<u64> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<V> Default for OrderedIndex<V>
where
    V: Copy + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_search_remove() {
        let index = OrderedIndex::new();
        index.set(42, 7usize);
        index.set(3, 1usize);

        assert_eq!(index.search(42), Some(7));
        assert_eq!(index.search(3), Some(1));
        assert_eq!(index.search(5), None);
        assert_eq!(index.len(), 2);

        assert_eq!(index.remove(42), Some(7));
        assert_eq!(index.remove(42), None);
        assert_eq!(index.search(42), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_set_replaces_value() {
        let index = OrderedIndex::new();
        index.set(9, 1u16);
        index.set(9, 2u16);

        assert_eq!(index.search(9), Some(2));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_keys_are_ordered() {
        let index = OrderedIndex::new();
        for key in [50u64, 10, 40, 20, 30] {
            index.set(key, key as usize);
        }

        assert_eq!(index.keys(), vec![10, 20, 30, 40, 50]);
        assert_eq!(index.first(), Some(10));
        assert_eq!(index.last(), Some(50));

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.first(), None);
    }
}
