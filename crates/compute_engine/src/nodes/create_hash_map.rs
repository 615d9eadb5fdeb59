use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::hash_map::{GpuHashMap, LOOKUP_SCHEME};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::storage::{decode_tile, TileStorageTexture};
use futures::future::BoxFuture;
use glam::UVec2;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("tile data", DataType::ByteBuffers),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", DataType::HashMap),
    SocketSpec::new("textures", DataType::TileStorage),
];

#[derive(Debug, Clone, Copy)]
pub struct CreateHashMapSettings {
    pub tile_resolution: UVec2,
    pub capacity: usize,
    pub format: wgpu::TextureFormat,
}

impl Default for CreateHashMapSettings {
    fn default() -> Self {
        Self { tile_resolution: UVec2::splat(256), capacity: 256, format: wgpu::TextureFormat::Rgba8Unorm }
    }
}

/// Uploads one storage layer per tile and maps tile ids to their layer.
/// Every run replaces the previous contents.
pub struct CreateHashMapNode {
    ctx: Arc<GpuContext>,
    hash_map: Arc<RwLock<GpuHashMap>>,
    storage: Arc<RwLock<TileStorageTexture>>,
    ran: bool,
}

impl CreateHashMapNode {
    pub fn new(ctx: Arc<GpuContext>, settings: CreateHashMapSettings) -> Result<Self> {
        let storage = TileStorageTexture::new(
            &ctx,
            "hash map tiles",
            settings.tile_resolution,
            settings.capacity,
            settings.format,
        )?;
        let hash_map = GpuHashMap::new(&ctx, settings.capacity);
        Ok(Self {
            ctx,
            hash_map: Arc::new(RwLock::new(hash_map)),
            storage: Arc::new(RwLock::new(storage)),
            ran: false,
        })
    }

    fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let ids = inputs.tile_ids("tile ids")?;
        let data = inputs.byte_buffers("tile data")?;
        if ids.len() != data.len() {
            return Err(ComputeError::InvalidInput(format!("{} tile ids but {} tile buffers", ids.len(), data.len())));
        }

        let mut storage = self.storage.write();
        let mut hash_map = self.hash_map.write();
        if ids.len() > storage.capacity() {
            return Err(ComputeError::CapacityExceeded {
                what: "tile storage".into(),
                required: ids.len(),
                available: storage.capacity(),
            });
        }
        storage.clear();
        hash_map.clear();

        let (format, resolution) = (storage.format(), storage.resolution());
        let decoded: Vec<_> = data
            .par_iter()
            .map(|bytes| match bytes.is_empty() {
                true => None,
                false => Some(decode_tile(bytes, format, resolution)),
            })
            .collect();

        for (id, texels) in ids.iter().zip(decoded) {
            let texels = match texels {
                Some(Ok(t)) => t,
                Some(Err(e)) => {
                    tracing::warn!(tile = %id, error = %e, "tile could not be decoded, skipping");
                    continue;
                }
                None => continue,
            };
            let layer = storage.reserve().ok_or_else(|| ComputeError::CapacityExceeded {
                what: "tile storage".into(),
                required: ids.len(),
                available: storage.capacity(),
            })?;
            storage.write_layer(&self.ctx, layer, &texels);
            hash_map.store(id.to(LOOKUP_SCHEME), layer)?;
        }
        hash_map.update_gpu_data(&self.ctx)?;
        tracing::debug!(tiles = hash_map.len(), "tile hash map created");
        self.ran = true;
        Ok(())
    }
}

impl Node for CreateHashMapNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        if !self.ran {
            return None;
        }
        match index {
            0 => Some(Data::HashMap(self.hash_map.clone())),
            1 => Some(Data::TileStorage(self.storage.clone())),
            _ => None,
        }
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        let result = self.run_impl(inputs);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use crate::storage::tests::png;
    use bytes::Bytes;
    use tile_core::{Id, Scheme};

    fn inputs(ids: Vec<Id>, data: Vec<Bytes>) -> Inputs {
        Inputs::new(INPUTS, vec![Data::TileIds(Arc::new(ids)), Data::ByteBuffers(Arc::new(data))])
    }

    #[tokio::test]
    async fn tiles_are_stored_and_mapped() {
        let Some(ctx) = context().await else { return };
        let settings = CreateHashMapSettings { tile_resolution: UVec2::splat(8), capacity: 4, ..Default::default() };
        let mut node = CreateHashMapNode::new(ctx, settings).unwrap();
        let ids = vec![Id::new(3, 1, 1, Scheme::Tms), Id::new(3, 1, 2, Scheme::SlippyMap), Id::new(3, 2, 2, Scheme::Tms)];
        let data = vec![Bytes::from(png(8, [255, 0, 0, 255])), Bytes::from(png(8, [0, 255, 0, 255])), Bytes::new()];
        node.run(inputs(ids, data)).await.unwrap();

        let map = node.hash_map.read();
        assert_eq!(map.len(), 2);
        assert!(map.contains(&Id::new(3, 1, 5, Scheme::Tms)));
        assert_eq!(node.storage.read().n_used(), 2);
    }

    #[tokio::test]
    async fn too_many_tiles_exceed_capacity() {
        let Some(ctx) = context().await else { return };
        let settings = CreateHashMapSettings { tile_resolution: UVec2::splat(8), capacity: 1, ..Default::default() };
        let mut node = CreateHashMapNode::new(ctx, settings).unwrap();
        let ids = vec![Id::root(), Id::new(1, 0, 0, Scheme::Tms)];
        let err = node.run(inputs(ids, vec![Bytes::new(), Bytes::new()])).await.unwrap_err();
        assert!(matches!(err, ComputeError::CapacityExceeded { .. }));
        assert!(node.output(0).is_none());
    }
}
