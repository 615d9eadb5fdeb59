use std::collections::{BTreeMap, HashMap};
use tile_core::Id;

/// Bounded LRU keyed by tile id. Access order lives in a `BTreeMap` keyed by
/// a monotonically increasing stamp, so touch and eviction are O(log n).
#[derive(Debug)]
pub struct Cache<T> {
    entries: HashMap<Id, (T, u64)>,
    order: BTreeMap<u64, Id>,
    clock: u64,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self { entries: HashMap::new(), order: BTreeMap::new(), clock: 0 }
    }
}

impl<T> Cache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Inserts or replaces `id` and marks it most recently used.
    pub fn insert(&mut self, id: Id, value: T) {
        let stamp = self.tick();
        if let Some((_, old)) = self.entries.insert(id, (value, stamp)) {
            self.order.remove(&old);
        }
        self.order.insert(stamp, id);
    }

    /// Marks `id` most recently used. Returns false if absent.
    pub fn touch(&mut self, id: &Id) -> bool {
        let stamp = self.clock + 1;
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        self.order.remove(&entry.1);
        entry.1 = stamp;
        self.clock = stamp;
        self.order.insert(stamp, *id);
        true
    }

    pub fn get(&mut self, id: &Id) -> Option<&T> {
        if !self.touch(id) {
            return None;
        }
        self.entries.get(id).map(|(v, _)| v)
    }

    /// Lookup without affecting recency.
    pub fn peek(&self, id: &Id) -> Option<&T> {
        self.entries.get(id).map(|(v, _)| v)
    }

    #[inline]
    pub fn contains(&self, id: &Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &Id) -> Option<T> {
        let (value, stamp) = self.entries.remove(id)?;
        self.order.remove(&stamp);
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids from least to most recently used.
    pub fn lru_order(&self) -> impl Iterator<Item = &Id> {
        self.order.values()
    }

    /// Evicts least recently used entries until at most `capacity` remain.
    pub fn purge(&mut self, capacity: usize) -> Vec<(Id, T)> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let Some((_, id)) = self.order.pop_first() else { break };
            if let Some((value, _)) = self.entries.remove(&id) {
                evicted.push((id, value));
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &Id> {
        self.entries.keys()
    }
}
