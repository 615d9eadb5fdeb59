//! Tile id to layer index map mirrored into two GPU buffers.
//!
//! The GPU side is an open-addressing table of [`TABLE_SIZE`] slots searched
//! linearly from `gpu_hash(id)`. Shaders include [`HASH_MAP_WGSL`] and bind the
//! key and value arrays as read-only storage buffers.

use crate::buffer::{ElementKind, GpuElement, RawBuffer};
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use std::collections::HashMap;
use tile_core::{gpu_hash, Id, Scheme};

pub const TABLE_SIZE: usize = 1 << 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuTileId {
    pub x: u32,
    pub y: u32,
    pub zoomlevel: u32,
    pub alignment: u32,
}

impl GpuTileId {
    pub const EMPTY: GpuTileId = GpuTileId { x: u32::MAX, y: u32::MAX, zoomlevel: u32::MAX, alignment: 0 };

    pub fn is_empty(&self) -> bool {
        self.zoomlevel == u32::MAX
    }
}

impl From<Id> for GpuTileId {
    fn from(id: Id) -> Self {
        Self { x: id.coords.x, y: id.coords.y, zoomlevel: id.zoom_level, alignment: 0 }
    }
}

impl GpuElement for GpuTileId {
    const KIND: ElementKind = ElementKind::TileId;
}

pub const EMPTY_VALUE: u32 = u32::MAX;

/// CPU image of the GPU table.
#[derive(Debug, Clone)]
pub struct SlotTables {
    pub keys: Vec<GpuTileId>,
    pub values: Vec<u32>,
}

impl SlotTables {
    pub fn build<'a>(entries: impl IntoIterator<Item = (&'a Id, &'a u32)>) -> Result<Self> {
        let mut keys = vec![GpuTileId::EMPTY; TABLE_SIZE];
        let mut values = vec![EMPTY_VALUE; TABLE_SIZE];
        for (id, value) in entries {
            let mut slot = usize::from(gpu_hash(id));
            let mut steps = 0;
            while !keys[slot].is_empty() {
                steps += 1;
                if steps == TABLE_SIZE {
                    return Err(ComputeError::CapacityExceeded {
                        what: "gpu hash table".into(),
                        required: TABLE_SIZE + 1,
                        available: TABLE_SIZE,
                    });
                }
                slot = (slot + 1) & (TABLE_SIZE - 1);
            }
            keys[slot] = GpuTileId::from(*id);
            values[slot] = *value;
        }
        Ok(Self { keys, values })
    }

    /// Same slot sequence the shader walks.
    pub fn lookup(&self, id: &Id) -> Option<u32> {
        let key = GpuTileId::from(*id);
        let mut slot = usize::from(gpu_hash(id));
        for _ in 0..TABLE_SIZE {
            let k = self.keys[slot];
            if k.is_empty() {
                return None;
            }
            if k == key {
                return Some(self.values[slot]);
            }
            slot = (slot + 1) & (TABLE_SIZE - 1);
        }
        None
    }
}

/// Entries keep their insertion order, so colliding ids always land in
/// the same slots for the same sequence of stores.
pub struct GpuHashMap {
    entries: Vec<(Id, u32)>,
    index: HashMap<Id, usize>,
    capacity: usize,
    keys: RawBuffer<GpuTileId>,
    values: RawBuffer<u32>,
}

impl GpuHashMap {
    pub fn new(ctx: &GpuContext, capacity: usize) -> Self {
        let keys = RawBuffer::storage(ctx, "hash map keys", TABLE_SIZE);
        let values = RawBuffer::storage(ctx, "hash map values", TABLE_SIZE);
        let map = Self { entries: Vec::new(), index: HashMap::new(), capacity: capacity.min(TABLE_SIZE), keys, values };
        // an all-zero key buffer would read as tile 0/0/0 everywhere
        map.keys.write(&ctx.queue, &vec![GpuTileId::EMPTY; TABLE_SIZE]);
        map.values.write(&ctx.queue, &vec![EMPTY_VALUE; TABLE_SIZE]);
        map
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&mut self, id: Id, value: u32) -> Result<()> {
        if let Some(&pos) = self.index.get(&id) {
            self.entries[pos].1 = value;
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            return Err(ComputeError::CapacityExceeded {
                what: "hash map".into(),
                required: self.entries.len() + 1,
                available: self.capacity,
            });
        }
        self.index.insert(id, self.entries.len());
        self.entries.push((id, value));
        Ok(())
    }

    pub fn remove(&mut self, id: &Id) -> Option<u32> {
        let pos = self.index.remove(id)?;
        let (_, value) = self.entries.remove(pos);
        for (later, _) in &self.entries[pos..] {
            if let Some(p) = self.index.get_mut(later) {
                *p -= 1;
            }
        }
        Some(value)
    }

    pub fn get(&self, id: &Id) -> Option<u32> {
        self.index.get(id).map(|&pos| self.entries[pos].1)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.index.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &u32)> {
        self.entries.iter().map(|(id, value)| (id, value))
    }

    /// Rebuilds both slot tables and uploads them.
    pub fn update_gpu_data(&self, ctx: &GpuContext) -> Result<()> {
        let tables = SlotTables::build(self.iter())?;
        self.keys.write(&ctx.queue, &tables.keys);
        self.values.write(&ctx.queue, &tables.values);
        tracing::trace!(entries = self.entries.len(), "hash map uploaded");
        Ok(())
    }

    pub fn key_binding(&self) -> wgpu::BindingResource<'_> {
        self.keys.binding()
    }

    pub fn value_binding(&self) -> wgpu::BindingResource<'_> {
        self.values.binding()
    }

    pub async fn read_back(&self, ctx: &GpuContext) -> Result<SlotTables> {
        Ok(SlotTables { keys: self.keys.read_back(ctx).await?, values: self.values.read_back(ctx).await? })
    }
}

/// Map keys are stored in the scheme callers insert them with; shaders in
/// this crate always look tiles up in TMS.
pub const LOOKUP_SCHEME: Scheme = Scheme::Tms;

/// Shader side of the table. Callers declare the key and value bindings as
/// `hash_map_keys` and `hash_map_values`.
pub const HASH_MAP_WGSL: &str = r#"
struct TileId {
    x: u32,
    y: u32,
    zoomlevel: u32,
    alignment: u32,
}

const HASH_TABLE_SIZE: u32 = 65536u;
const HASH_EMPTY_ZOOM: u32 = 0xffffffffu;

fn fnv_word(h_in: u32, w: u32) -> u32 {
    var h = h_in;
    for (var i = 0u; i < 4u; i++) {
        h = (h ^ ((w >> (8u * i)) & 0xffu)) * 16777619u;
    }
    return h;
}

fn tile_hash(id: TileId) -> u32 {
    var h = 2166136261u ^ 3938u;
    h = fnv_word(h, id.zoomlevel);
    h = fnv_word(h, id.x);
    h = fnv_word(h, id.y);
    return (h ^ (h >> 16u)) & 0xffffu;
}

fn hash_map_lookup(id: TileId, value: ptr<function, u32>) -> bool {
    var slot = tile_hash(id);
    for (var i = 0u; i < HASH_TABLE_SIZE; i++) {
        let key = hash_map_keys[slot];
        if (key.zoomlevel == HASH_EMPTY_ZOOM) {
            return false;
        }
        if (key.x == id.x && key.y == id.y && key.zoomlevel == id.zoomlevel) {
            *value = hash_map_values[slot];
            return true;
        }
        slot = (slot + 1u) & (HASH_TABLE_SIZE - 1u);
    }
    return false;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;

    fn colliding_pair() -> (Id, Id) {
        (Id::new(11, 59333, 45444, Scheme::Tms), Id::new(5, 20012, 35075, Scheme::Tms))
    }

    fn pairs(entries: &[(Id, u32)]) -> impl Iterator<Item = (&Id, &u32)> {
        entries.iter().map(|(id, value)| (id, value))
    }

    fn occupied_slots(tables: &SlotTables) -> Vec<usize> {
        (0..TABLE_SIZE).filter(|&slot| !tables.keys[slot].is_empty()).collect()
    }

    /// key1 at its home slot, key2 right behind it, nothing anywhere else.
    fn assert_collision_layout(tables: &SlotTables, first: (Id, u32), second: (Id, u32)) {
        let h = usize::from(gpu_hash(&first.0));
        let next = (h + 1) & (TABLE_SIZE - 1);
        assert_eq!(tables.keys[h], GpuTileId::from(first.0));
        assert_eq!(tables.values[h], first.1);
        assert_eq!(tables.keys[next], GpuTileId::from(second.0));
        assert_eq!(tables.values[next], second.1);
        assert_eq!(occupied_slots(tables), {
            let mut slots = vec![h, next];
            slots.sort_unstable();
            slots
        });
        let filled_values = tables.values.iter().filter(|&&v| v != EMPTY_VALUE).count();
        assert_eq!(filled_values, 2);
    }

    #[test]
    fn colliding_ids_are_both_found() {
        let (a, b) = colliding_pair();
        assert_eq!(gpu_hash(&a), gpu_hash(&b));
        let tables = SlotTables::build(pairs(&[(a, 1), (b, 2)])).unwrap();
        assert_eq!(tables.lookup(&a), Some(1));
        assert_eq!(tables.lookup(&b), Some(2));
        assert_eq!(tables.lookup(&Id::new(11, 59333, 45445, Scheme::Tms)), None);
    }

    #[test]
    fn first_stored_id_keeps_its_home_slot() {
        let (a, b) = colliding_pair();
        let tables = SlotTables::build(pairs(&[(a, 1), (b, 2)])).unwrap();
        assert_collision_layout(&tables, (a, 1), (b, 2));

        let swapped = SlotTables::build(pairs(&[(b, 2), (a, 1)])).unwrap();
        assert_collision_layout(&swapped, (b, 2), (a, 1));
    }

    #[test]
    fn lookups_wrap_around_the_table_end() {
        let last = (TABLE_SIZE - 1) as u16;
        let ids: Vec<Id> = (0..1024u32)
            .flat_map(|x| (0..1024u32).map(move |y| Id::new(10, x, y, Scheme::Tms)))
            .filter(|id| gpu_hash(id) == last)
            .take(2)
            .collect();
        assert_eq!(ids.len(), 2);
        let tables = SlotTables::build(pairs(&[(ids[0], 10), (ids[1], 11)])).unwrap();
        assert_eq!(tables.keys[TABLE_SIZE - 1], GpuTileId::from(ids[0]));
        assert_eq!(tables.keys[0], GpuTileId::from(ids[1]));
        assert_eq!(tables.lookup(&ids[0]), Some(10));
        assert_eq!(tables.lookup(&ids[1]), Some(11));
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let Some(ctx) = context().await else { return };
        let mut map = GpuHashMap::new(&ctx, 1);
        map.store(Id::root(), 0).unwrap();
        map.store(Id::root(), 3).unwrap();
        assert_eq!(map.get(&Id::root()), Some(3));
        assert!(matches!(
            map.store(Id::new(1, 0, 0, Scheme::Tms), 1),
            Err(ComputeError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn stores_keep_insertion_order_after_removal() {
        let Some(ctx) = context().await else { return };
        let ids: Vec<Id> = (0..4).map(|x| Id::new(2, x, 1, Scheme::Tms)).collect();
        let mut map = GpuHashMap::new(&ctx, 8);
        for (i, id) in ids.iter().enumerate() {
            map.store(*id, i as u32).unwrap();
        }
        assert_eq!(map.remove(&ids[1]), Some(1));
        assert_eq!(map.remove(&ids[1]), None);
        map.store(ids[0], 9).unwrap();
        let order: Vec<(Id, u32)> = map.iter().map(|(id, v)| (*id, *v)).collect();
        assert_eq!(order, vec![(ids[0], 9), (ids[2], 2), (ids[3], 3)]);
        assert_eq!(map.get(&ids[3]), Some(3));
    }

    #[tokio::test]
    async fn uploaded_table_has_the_collision_layout() {
        let Some(ctx) = context().await else { return };
        let (a, b) = colliding_pair();
        let mut map = GpuHashMap::new(&ctx, 16);
        map.store(a, 1).unwrap();
        map.store(b, 2).unwrap();
        map.update_gpu_data(&ctx).unwrap();
        let tables = map.read_back(&ctx).await.unwrap();
        assert_eq!(tables.keys.len(), TABLE_SIZE);
        assert_eq!(tables.values.len(), TABLE_SIZE);
        assert_collision_layout(&tables, (a, 1), (b, 2));
    }

    #[tokio::test]
    async fn removed_and_cleared_ids_vanish_from_the_gpu() {
        let Some(ctx) = context().await else { return };
        let (a, b) = colliding_pair();
        let mut map = GpuHashMap::new(&ctx, 16);
        map.store(a, 1).unwrap();
        map.store(b, 2).unwrap();
        map.update_gpu_data(&ctx).unwrap();

        map.remove(&a);
        map.update_gpu_data(&ctx).unwrap();
        let tables = map.read_back(&ctx).await.unwrap();
        assert_eq!(tables.lookup(&a), None);
        assert_eq!(tables.lookup(&b), Some(2));
        // b moves up into its home slot once a is gone
        assert_eq!(occupied_slots(&tables), vec![usize::from(gpu_hash(&b))]);

        map.clear();
        map.update_gpu_data(&ctx).unwrap();
        let tables = map.read_back(&ctx).await.unwrap();
        assert_eq!(tables.lookup(&b), None);
        assert!(occupied_slots(&tables).is_empty());
        assert!(tables.values.iter().all(|&v| v == EMPTY_VALUE));
    }
}
