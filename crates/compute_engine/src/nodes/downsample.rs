use crate::buffer::{Buffer, RawBuffer};
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::hash_map::{GpuHashMap, GpuTileId, HASH_MAP_WGSL, LOOKUP_SCHEME};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::storage::TileStorageTexture;
use futures::future::BoxFuture;
use glam::UVec3;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tile_core::Id;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("hash map", DataType::HashMap),
    SocketSpec::new("textures", DataType::TileStorage),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("hash map", DataType::HashMap),
    SocketSpec::new("textures", DataType::TileStorage),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampleSettings {
    pub num_levels: u32,
}

impl Default for DownsampleSettings {
    fn default() -> Self {
        Self { num_levels: 1 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct DownsampleUniform {
    resolution: [u32; 2],
    n_parents: u32,
    _pad: u32,
}

const DOWNSAMPLE_WGSL: &str = r#"
struct Params {
    resolution: vec2<u32>,
    n_parents: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source: texture_2d_array<f32>;
@group(0) @binding(2) var<storage, read> hash_map_keys: array<TileId>;
@group(0) @binding(3) var<storage, read> hash_map_values: array<u32>;
@group(0) @binding(4) var<storage, read> parents: array<TileId>;
@group(0) @binding(5) var scratch: texture_storage_2d_array<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.resolution.x || id.y >= params.resolution.y || id.z >= params.n_parents) {
        return;
    }
    let parent = parents[id.z];
    let half = params.resolution / 2u;
    // tms: the northern (upper) half holds the children with odd y
    let quadrant = vec2<u32>(select(0u, 1u, id.x >= half.x), select(1u, 0u, id.y >= half.y));
    let child = TileId(parent.x * 2u + quadrant.x, parent.y * 2u + quadrant.y, parent.zoomlevel + 1u, 0u);

    var layer = 0u;
    var colour = vec4<f32>(0.0);
    if (hash_map_lookup(child, &layer)) {
        let base = vec2<i32>((id.xy % half) * 2u);
        for (var dy = 0; dy < 2; dy++) {
            for (var dx = 0; dx < 2; dx++) {
                colour += textureLoad(source, base + vec2<i32>(dx, dy), i32(layer), 0);
            }
        }
        colour *= 0.25;
    }
    textureStore(scratch, vec2<i32>(id.xy), i32(id.z), colour);
}
"#;

/// Builds coarser levels of a tile pyramid in place: each parent is the 2×2
/// box filter of its four children and is stored in a free layer of the
/// same storage texture and registered in the same hash map.
pub struct DownsampleTilesNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<DownsampleUniform>,
    settings: DownsampleSettings,
    output: Option<(Arc<Vec<Id>>, Arc<RwLock<GpuHashMap>>, Arc<RwLock<TileStorageTexture>>)>,
}

/// New parent ids per level. Parents already present in `map` are not
/// rebuilt but still seed the next level.
fn plan_levels(ids: &[Id], map: &GpuHashMap, num_levels: u32) -> Vec<Vec<Id>> {
    let mut current: BTreeSet<Id> = ids.iter().map(|id| id.to(LOOKUP_SCHEME)).filter(|id| map.contains(id)).collect();
    let mut levels = Vec::new();
    for _ in 0..num_levels {
        let parents: BTreeSet<Id> = current.iter().filter_map(|id| id.parent()).collect();
        if parents.is_empty() {
            break;
        }
        levels.push(parents.iter().copied().filter(|p| !map.contains(p)).collect());
        current = parents;
    }
    levels
}

impl DownsampleTilesNode {
    pub fn new(ctx: Arc<GpuContext>, settings: DownsampleSettings) -> Self {
        let source = format!("{HASH_MAP_WGSL}\n{DOWNSAMPLE_WGSL}");
        let pipeline = ComputePipeline::new(
            &ctx,
            "downsample tiles",
            &source,
            "main",
            &[
                Binding::Uniform,
                Binding::TextureArray,
                Binding::Storage { read_only: true },
                Binding::Storage { read_only: true },
                Binding::Storage { read_only: true },
                Binding::StorageTextureArray { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "downsample params", DownsampleUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    fn build_level(&mut self, storage: &mut TileStorageTexture, map: &mut GpuHashMap, parents: &[Id]) -> Result<()> {
        let resolution = storage.resolution();
        let scratch = TileStorageTexture::new(&self.ctx, "downsample scratch", resolution, parents.len(), storage.format())?;
        let parent_list = RawBuffer::<GpuTileId>::storage(&self.ctx, "downsample parents", parents.len());
        parent_list.write(&self.ctx.queue, &parents.iter().map(|p| GpuTileId::from(*p)).collect::<Vec<_>>());
        self.uniform.data = DownsampleUniform { resolution: resolution.to_array(), n_parents: parents.len() as u32, _pad: 0 };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&storage.view),
                map.key_binding(),
                map.value_binding(),
                parent_list.binding(),
                wgpu::BindingResource::TextureView(&scratch.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "downsample tiles");
        self.pipeline.dispatch(&mut encoder, &bind_group, UVec3::new(resolution.x, resolution.y, parents.len() as u32));

        for (i, parent) in parents.iter().enumerate() {
            let layer = storage.reserve().ok_or_else(|| ComputeError::CapacityExceeded {
                what: "tile storage".into(),
                required: storage.capacity() + 1,
                available: storage.capacity(),
            })?;
            encoder.copy_texture_to_texture(
                wgpu::ImageCopyTexture {
                    texture: &scratch.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: i as u32 },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyTexture {
                    texture: &storage.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d { width: resolution.x, height: resolution.y, depth_or_array_layers: 1 },
            );
            map.store(*parent, layer)?;
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        // the next level looks these parents up as children
        map.update_gpu_data(&self.ctx)
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let ids = inputs.tile_ids("tile ids")?;
        let hash_map = inputs.hash_map("hash map")?;
        let textures = inputs.tile_storage("textures")?;

        let all_ids = {
            let mut storage = textures.write();
            let mut map = hash_map.write();
            if storage.format() != wgpu::TextureFormat::Rgba8Unorm {
                return Err(ComputeError::InvalidInput(format!("cannot downsample {:?} tiles", storage.format())));
            }
            if storage.resolution().x % 2 != 0 || storage.resolution().y % 2 != 0 {
                return Err(ComputeError::InvalidInput(format!("tile resolution {} is odd", storage.resolution())));
            }

            let levels = plan_levels(&ids, &map, self.settings.num_levels);
            let required: usize = levels.iter().map(Vec::len).sum();
            if required > storage.n_free() {
                return Err(ComputeError::CapacityExceeded {
                    what: "tile storage layers for downsampled parents".into(),
                    required,
                    available: storage.n_free(),
                });
            }
            if map.len() + required > map.capacity() {
                return Err(ComputeError::CapacityExceeded {
                    what: "hash map entries for downsampled parents".into(),
                    required: map.len() + required,
                    available: map.capacity(),
                });
            }

            for parents in levels.iter().filter(|p| !p.is_empty()) {
                self.build_level(&mut storage, &mut map, parents)?;
            }
            tracing::debug!(levels = levels.len(), parents = required, "tile pyramid extended");

            let mut all: Vec<Id> = ids.iter().copied().chain(levels.into_iter().flatten()).collect();
            all.sort();
            all.dedup();
            all
        };
        self.ctx.submitted_work_done().await?;

        self.output = Some((Arc::new(all_ids), hash_map, textures));
        Ok(())
    }
}

impl Node for DownsampleTilesNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        let (ids, map, textures) = self.output.as_ref()?;
        match index {
            0 => Some(Data::TileIds(ids.clone())),
            1 => Some(Data::HashMap(map.clone())),
            2 => Some(Data::TileStorage(textures.clone())),
            _ => None,
        }
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}
