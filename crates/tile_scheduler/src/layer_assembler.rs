use crate::network::Status;
use crate::tile_types::{Layer, LayeredTile, TileLayer};
use bytes::Bytes;
use std::collections::HashMap;
use tile_core::Id;

/// Fire-and-forget request of one layer; the answer comes back through
/// whatever channel the implementation owns.
pub trait LayerLoader: Send {
    fn load(&self, layer: Layer, id: Id);
}

#[derive(Debug, Default)]
struct PendingTile {
    layers: [Option<TileLayer>; 3],
}

/// Joins independently arriving layers of a tile into one [`LayeredTile`].
pub struct LayerAssembler {
    layers: Vec<Layer>,
    loader: Box<dyn LayerLoader>,
    pending: HashMap<Id, PendingTile>,
}

impl LayerAssembler {
    pub fn new(layers: Vec<Layer>, loader: Box<dyn LayerLoader>) -> Self {
        let mut layers = layers;
        layers.sort();
        layers.dedup();
        Self { layers, loader, pending: HashMap::new() }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Issues one request per configured layer. Repeated loads of an open id are no-ops.
    pub fn load(&mut self, id: Id) {
        if self.pending.contains_key(&id) {
            return;
        }
        self.pending.insert(id, PendingTile::default());
        for layer in &self.layers {
            self.loader.load(*layer, id);
        }
    }

    /// Stores one layer; returns the joined tile once every layer is in.
    pub fn deliver(&mut self, layer: Layer, tile: TileLayer) -> Option<LayeredTile> {
        if !self.layers.contains(&layer) {
            tracing::warn!(tile = %tile.id, ?layer, "delivery for unconfigured layer dropped");
            return None;
        }
        let id = tile.id;
        let Some(entry) = self.pending.get_mut(&id) else {
            tracing::debug!(tile = %id, ?layer, "delivery for tile that was never requested dropped");
            return None;
        };
        let slot = &mut entry.layers[layer.index()];
        if slot.is_some() {
            return None;
        }
        *slot = Some(tile);

        if self.layers.iter().any(|l| entry.layers[l.index()].is_none()) {
            return None;
        }
        let mut done = self.pending.remove(&id)?;
        let [ortho, height, vector] = std::mem::take(&mut done.layers);
        Some(LayeredTile::join(id, ortho, height, vector))
    }

    pub fn deliver_ortho(&mut self, tile: TileLayer) -> Option<LayeredTile> {
        self.deliver(Layer::Ortho, tile)
    }

    pub fn deliver_height(&mut self, tile: TileLayer) -> Option<LayeredTile> {
        self.deliver(Layer::Height, tile)
    }

    pub fn deliver_vectortile(&mut self, tile: TileLayer) -> Option<LayeredTile> {
        self.deliver(Layer::Vector, tile)
    }

    /// Shorthand for delivering an empty NotFound layer.
    pub fn notify_unavailable(&mut self, layer: Layer, id: Id) -> Option<LayeredTile> {
        self.deliver(layer, TileLayer::new(id, Status::NotFound, Bytes::new()))
    }

    /// Forgets an open id; late deliveries for it are then dropped.
    pub fn cancel(&mut self, id: &Id) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn is_pending(&self, id: &Id) -> bool {
        self.pending.contains_key(id)
    }

    /// Per-layer responses still owed across all open ids.
    pub fn n_items_in_flight(&self) -> usize {
        self.pending
            .values()
            .map(|p| self.layers.iter().filter(|l| p.layers[l.index()].is_none()).count())
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tile_core::Scheme;

    #[derive(Clone, Default)]
    pub(crate) struct RecordingLoader {
        pub calls: Arc<Mutex<Vec<(Layer, Id)>>>,
    }

    impl LayerLoader for RecordingLoader {
        fn load(&self, layer: Layer, id: Id) {
            self.calls.lock().push((layer, id));
        }
    }

    fn good(id: Id, body: &'static [u8]) -> TileLayer {
        TileLayer::new(id, Status::Good, Bytes::from_static(body))
    }

    fn permutations(items: &[Layer]) -> Vec<Vec<Layer>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn load_requests_each_layer_once() {
        let loader = RecordingLoader::default();
        let mut asm = LayerAssembler::new(vec![Layer::Height, Layer::Ortho], Box::new(loader.clone()));
        let id = Id::new(5, 3, 4, Scheme::Tms);
        asm.load(id);
        asm.load(id);
        assert_eq!(*loader.calls.lock(), vec![(Layer::Ortho, id), (Layer::Height, id)]);
        assert_eq!(asm.n_items_in_flight(), 2);
    }

    #[test]
    fn every_delivery_order_yields_one_good_tile() {
        let id = Id::new(0, 0, 0, Scheme::Tms);
        for order in permutations(&Layer::ALL) {
            let mut asm = LayerAssembler::new(Layer::ALL.to_vec(), Box::new(RecordingLoader::default()));
            asm.load(id);
            let mut emitted = Vec::new();
            for layer in order {
                let body: &'static [u8] = match layer {
                    Layer::Ortho => b"O",
                    Layer::Height => b"H",
                    Layer::Vector => b"V",
                };
                emitted.extend(asm.deliver(layer, good(id, body)));
            }
            assert_eq!(emitted.len(), 1);
            let tile = &emitted[0];
            assert_eq!(tile.status(), Status::Good);
            assert_eq!(&tile.ortho[..], b"O");
            assert_eq!(&tile.height[..], b"H");
            assert_eq!(tile.vector.as_deref(), Some(&b"V"[..]));
            assert_eq!(asm.n_items_in_flight(), 0);
        }
    }

    #[test]
    fn one_missing_layer_clears_all_bodies() {
        let id = Id::new(0, 0, 0, Scheme::Tms);
        let mut asm = LayerAssembler::new(Layer::ALL.to_vec(), Box::new(RecordingLoader::default()));
        asm.load(id);
        assert!(asm.deliver_ortho(good(id, b"O")).is_none());
        assert!(asm.notify_unavailable(Layer::Height, id).is_none());
        let tile = asm.deliver_vectortile(good(id, b"V")).unwrap();
        assert_eq!(tile.status(), Status::NotFound);
        assert!(tile.ortho.is_empty());
        assert!(tile.height.is_empty());
        assert_eq!(tile.vector.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn network_error_dominates_not_found() {
        let id = Id::new(1, 1, 0, Scheme::Tms);
        let mut asm = LayerAssembler::new(vec![Layer::Ortho, Layer::Height], Box::new(RecordingLoader::default()));
        asm.load(id);
        asm.notify_unavailable(Layer::Ortho, id);
        let tile = asm.deliver_height(TileLayer::new(id, Status::NetworkError, Bytes::new())).unwrap();
        assert_eq!(tile.status(), Status::NetworkError);
        assert!(tile.vector.is_none());
    }

    #[test]
    fn duplicates_and_strangers_are_ignored() {
        let id = Id::new(2, 1, 1, Scheme::Tms);
        let stranger = Id::new(2, 0, 0, Scheme::Tms);
        let mut asm = LayerAssembler::new(vec![Layer::Ortho, Layer::Height], Box::new(RecordingLoader::default()));
        asm.load(id);
        assert!(asm.deliver_ortho(good(id, b"O")).is_none());
        assert!(asm.deliver_ortho(good(id, b"O2")).is_none());
        assert_eq!(asm.n_items_in_flight(), 1);

        assert!(asm.deliver_height(good(stranger, b"H")).is_none());
        assert!(asm.deliver_vectortile(good(id, b"V")).is_none());
        assert_eq!(asm.n_items_in_flight(), 1);

        let tile = asm.deliver_height(good(id, b"H")).unwrap();
        assert_eq!(&tile.ortho[..], b"O");
    }
}
