//! A bounded, thread-safe LRU cache used to front the disk-backed adjacency
//! tier. Capacity 0 is legal and simply disables insertion.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Intrusive doubly-linked list over a slab, most-recently-used at the
/// front. Indices are stable for the lifetime of an entry; removed slots are
/// recycled via `free`.
struct Inner<K, V> {
    slab: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn new(capacity: usize) -> Self {
        Inner {
            slab: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.slab[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slab[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.slab[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.slab[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn evict_tail(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        self.detach(tail);
        let node = self.slab[tail].take().unwrap();
        self.index.remove(&node.key);
        self.free.push(tail);
        Some((node.key, node.value))
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        if let Some(&idx) = self.index.get(&key) {
            let old = std::mem::replace(&mut self.slab[idx].as_mut().unwrap().value, value);
            self.touch(idx);
            return Some(old);
        }
        while self.index.len() >= self.capacity {
            if self.evict_tail().is_none() {
                break;
            }
        }
        let idx = match self.free.pop() {
            Some(i) => {
                self.slab[i] = Some(Node {
                    key: key.clone(),
                    value,
                    prev: None,
                    next: None,
                });
                i
            }
            None => {
                self.slab.push(Some(Node {
                    key: key.clone(),
                    value,
                    prev: None,
                    next: None,
                }));
                self.slab.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);
        None
    }

    fn get(&mut self, key: &K) -> Option<&V>
    where
        V: Clone,
    {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slab[idx].as_ref().map(|n| &n.value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.detach(idx);
        let node = self.slab[idx].take().unwrap();
        self.free.push(idx);
        Some(node.value)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// A bounded LRU cache safe to share behind an `Arc`.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        LruCache {
            inner: Mutex::new(Inner::new(capacity)),
        }
    }

    /// Inserts, returning the previous value if the key was already present.
    /// A no-op (always returns `None`) when capacity is 0.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.lock().insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::new(inner.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
        assert_eq!(cache.get(&3), Some("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.get(&1);
        cache.insert(3, "c");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn capacity_zero_disables_insertion() {
        let cache: LruCache<i32, &str> = LruCache::new(0);
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn reinserting_existing_key_updates_value_and_recency() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        let old = cache.insert(1, "a2");
        assert_eq!(old, Some("a"));
        cache.insert(3, "c");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a2"));
    }

    #[test]
    fn remove_drops_entry() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        assert_eq!(cache.remove(&1), Some("a"));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }
}
