use std::collections::HashMap;
use std::hash::Hash;

struct Entry<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

const NONE: usize = usize::MAX;

/// An LRU cache with O(1) get/put/remove.
///
/// Entries live in a slab (`Vec<Option<Entry>>`) threaded as a doubly
/// linked list, with freed slots recycled through a free list. The cache
/// never holds more than `capacity` entries: `push` evicts and returns
/// the least-recently-used entry when inserting into a full cache.
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slab: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be > 0");
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slab: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NONE,
            tail: NONE,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.slab[idx].as_ref().map(|e| &e.value)
    }

    /// Look up a value mutably and mark it most recently used.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.slab[idx].as_mut().map(|e| &mut e.value)
    }

    /// Look up a value without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.slab[idx].as_ref().map(|e| &e.value)
    }

    /// Mutable lookup without touching recency.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.slab[idx].as_mut().map(|e| &mut e.value)
    }

    /// Insert a value, returning `Replaced` with the old value when the
    /// key was present, or `Evicted` with the least-recently-used entry
    /// when the cache was full.
    pub fn push(&mut self, key: K, value: V) -> Pushed<K, V> {
        if let Some(&idx) = self.map.get(&key) {
            let entry = self.slab[idx].as_mut().unwrap();
            let old = std::mem::replace(&mut entry.value, value);
            self.move_to_front(idx);
            return Pushed::Replaced(old);
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let idx = match self.free.pop() {
            Some(slot) => {
                self.slab[slot] = Some(Entry {
                    key: key.clone(),
                    value,
                    prev: NONE,
                    next: NONE,
                });
                slot
            }
            None => {
                self.slab.push(Some(Entry {
                    key: key.clone(),
                    value,
                    prev: NONE,
                    next: NONE,
                }));
                self.slab.len() - 1
            }
        };
        self.attach_front(idx);
        self.map.insert(key, idx);

        match evicted {
            Some((k, v)) => Pushed::Evicted(k, v),
            None => Pushed::Inserted,
        }
    }

    /// Remove and return the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        if self.tail == NONE {
            return None;
        }
        let idx = self.tail;
        self.detach(idx);
        let entry = self.slab[idx].take().unwrap();
        self.map.remove(&entry.key);
        self.free.push(idx);
        Some((entry.key, entry.value))
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        let entry = self.slab[idx].take().unwrap();
        self.free.push(idx);
        Some(entry.value)
    }

    /// Visit every entry in slab order (recency is not affected).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slab
            .iter()
            .filter_map(|slot| slot.as_ref().map(|e| (&e.key, &e.value)))
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slab.clear();
        self.free.clear();
        self.head = NONE;
        self.tail = NONE;
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn attach_front(&mut self, idx: usize) {
        {
            let entry = self.slab[idx].as_mut().unwrap();
            entry.prev = NONE;
            entry.next = self.head;
        }
        if self.head != NONE {
            self.slab[self.head].as_mut().unwrap().prev = idx;
        }
        self.head = idx;
        if self.tail == NONE {
            self.tail = idx;
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = self.slab[idx].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        if prev != NONE {
            self.slab[prev].as_mut().unwrap().next = next;
        } else {
            self.head = next;
        }
        if next != NONE {
            self.slab[next].as_mut().unwrap().prev = prev;
        } else {
            self.tail = prev;
        }
    }
}

/// Outcome of [`LruCache::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pushed<K, V> {
    /// A new entry was inserted with room to spare.
    Inserted,
    /// The key existed; its previous value is returned.
    Replaced(V),
    /// The cache was full; the evicted LRU entry is returned.
    Evicted(K, V),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_get() {
        let mut cache = LruCache::new(2);
        assert_eq!(cache.push("a", 1), Pushed::Inserted);
        assert_eq!(cache.push("b", 2), Pushed::Inserted);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction_order() {
        let mut cache = LruCache::new(2);
        cache.push("a", 1);
        cache.push("b", 2);
        assert_eq!(cache.push("c", 3), Pushed::Evicted("a", 1));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_access_refreshes() {
        let mut cache = LruCache::new(2);
        cache.push("a", 1);
        cache.push("b", 2);
        cache.get(&"a");
        assert_eq!(cache.push("c", 3), Pushed::Evicted("b", 2));
        assert_eq!(cache.get(&"a"), Some(&1));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = LruCache::new(2);
        cache.push("a", 1);
        cache.push("b", 2);
        cache.peek(&"a");
        assert_eq!(cache.push("c", 3), Pushed::Evicted("a", 1));
    }

    #[test]
    fn test_replace() {
        let mut cache = LruCache::new(2);
        cache.push("a", 1);
        assert_eq!(cache.push("a", 10), Pushed::Replaced(1));
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut cache = LruCache::new(2);
        cache.push("a", 1);
        cache.push("b", 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.len(), 1);
        // Freed slot is reused, no eviction needed.
        assert_eq!(cache.push("c", 3), Pushed::Inserted);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_pop_lru() {
        let mut cache = LruCache::new(3);
        cache.push("a", 1);
        cache.push("b", 2);
        cache.push("c", 3);
        cache.get(&"a");
        assert_eq!(cache.pop_lru(), Some(("b", 2)));
        assert_eq!(cache.pop_lru(), Some(("c", 3)));
        assert_eq!(cache.pop_lru(), Some(("a", 1)));
        assert_eq!(cache.pop_lru(), None);
    }

    #[test]
    fn test_iter_sees_all() {
        let mut cache = LruCache::new(4);
        cache.push(1u64, "x");
        cache.push(2u64, "y");
        cache.push(3u64, "z");
        let mut keys: Vec<u64> = cache.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2, 3]);
    }
}
