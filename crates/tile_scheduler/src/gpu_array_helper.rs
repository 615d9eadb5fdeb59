use std::collections::{BTreeMap, BTreeSet, HashMap};
use tile_core::Id;

/// Texture-array slot currently holding `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInfo {
    pub index: u32,
    pub id: Id,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    slot: u32,
    stamp: u64,
}

/// CPU-side mirror of a fixed-size texture array: tile id to layer index,
/// recency order and free list. Used slots map back to exactly one id.
#[derive(Debug)]
pub struct GpuArrayHelper {
    capacity: usize,
    slots: Vec<Option<Id>>,
    entries: HashMap<Id, Entry>,
    lru: BTreeMap<u64, Id>,
    free: BTreeSet<u32>,
    clock: u64,
}

impl GpuArrayHelper {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: vec![None; capacity],
            entries: HashMap::with_capacity(capacity),
            lru: BTreeMap::new(),
            free: (0..capacity as u32).collect(),
            clock: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn n_used(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn contains(&self, id: &Id) -> bool {
        self.entries.contains_key(id)
    }

    fn promote(&mut self, id: Id) -> Option<u32> {
        self.clock += 1;
        let stamp = self.clock;
        let entry = self.entries.get_mut(&id)?;
        self.lru.remove(&entry.stamp);
        entry.stamp = stamp;
        self.lru.insert(stamp, id);
        Some(entry.slot)
    }

    /// Slot for `id`: the existing one, the lowest free one, or the slot of the
    /// least recently used tile, whose id is handed to `on_evict`.
    ///
    /// Returns `None` only for a zero-capacity array.
    pub fn add_tile(&mut self, id: Id, mut on_evict: impl FnMut(Id)) -> Option<u32> {
        if let Some(slot) = self.promote(id) {
            return Some(slot);
        }
        let slot = match self.free.pop_first() {
            Some(slot) => slot,
            None => {
                let (_, victim) = self.lru.pop_first()?;
                let entry = self.entries.remove(&victim)?;
                on_evict(victim);
                entry.slot
            }
        };
        self.clock += 1;
        self.entries.insert(id, Entry { slot, stamp: self.clock });
        self.lru.insert(self.clock, id);
        self.slots[slot as usize] = Some(id);
        Some(slot)
    }

    /// Frees the slot of `id`. Idempotent.
    pub fn remove_tile(&mut self, id: &Id) -> Option<u32> {
        let entry = self.entries.remove(id)?;
        self.lru.remove(&entry.stamp);
        self.slots[entry.slot as usize] = None;
        self.free.insert(entry.slot);
        Some(entry.slot)
    }

    /// Exact slot for `id` or, failing that, the slot of its nearest stored ancestor.
    pub fn layer(&mut self, id: Id) -> Option<LayerInfo> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if let Some(index) = self.promote(candidate) {
                return Some(LayerInfo { index, id: candidate });
            }
            current = candidate.parent();
        }
        None
    }

    /// Id occupying `slot`, if any.
    pub fn tile_at(&self, slot: u32) -> Option<Id> {
        self.slots.get(slot as usize).copied().flatten()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Id> {
        self.entries.keys()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.slots.iter_mut().for_each(|s| *s = None);
        self.free = (0..self.capacity as u32).collect();
    }
}
