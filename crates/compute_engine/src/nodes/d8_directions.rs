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
use std::sync::Arc;
use tile_core::Id;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("hash map", DataType::HashMap),
    SocketSpec::new("height textures", DataType::TileStorage),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("hash map", DataType::HashMap),
    SocketSpec::new("d8 direction textures", DataType::TileStorage),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D8Settings {
    pub capacity: usize,
}

impl Default for D8Settings {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct D8Uniform {
    resolution: [u32; 2],
    n_tiles: u32,
    _pad: u32,
}

const D8_WGSL: &str = r#"
struct Params {
    resolution: vec2<u32>,
    n_tiles: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> tile_ids: array<TileId>;
@group(0) @binding(2) var<storage, read> hash_map_keys: array<TileId>;
@group(0) @binding(3) var<storage, read> hash_map_values: array<u32>;
@group(0) @binding(4) var heights: texture_2d_array<u32>;
@group(0) @binding(5) var directions: texture_storage_2d_array<rgba8unorm, write>;

var<private> OFFSETS: array<vec2<i32>, 8> = array<vec2<i32>, 8>(
    vec2<i32>(0, -1), vec2<i32>(1, -1), vec2<i32>(1, 0), vec2<i32>(1, 1),
    vec2<i32>(0, 1), vec2<i32>(-1, 1), vec2<i32>(-1, 0), vec2<i32>(-1, -1),
);
var<private> CODES: array<u32, 8> = array<u32, 8>(64u, 128u, 1u, 2u, 4u, 8u, 16u, 32u);

// Texels beyond the tile edge are read from the neighbouring tile. Rows grow
// southwards while TMS y grows northwards.
fn height_at(tile: TileId, texel: vec2<i32>, height: ptr<function, f32>) -> bool {
    let res = vec2<i32>(params.resolution);
    let shift = vec2<i32>(
        select(0, -1, texel.x < 0) + select(0, 1, texel.x >= res.x),
        select(0, -1, texel.y < 0) + select(0, 1, texel.y >= res.y),
    );
    var neighbour = tile;
    neighbour.x = u32(i32(tile.x) + shift.x);
    neighbour.y = u32(i32(tile.y) - shift.y);
    var layer = 0u;
    if (!hash_map_lookup(neighbour, &layer)) {
        return false;
    }
    *height = f32(textureLoad(heights, texel - shift * res, i32(layer), 0).r);
    return true;
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.resolution.x || id.y >= params.resolution.y || id.z >= params.n_tiles) {
        return;
    }
    let tile = tile_ids[id.z];
    let texel = vec2<i32>(id.xy);
    var centre = 0.0;
    var code = 0u;
    if (height_at(tile, texel, &centre)) {
        var best = 0.0;
        for (var k = 0u; k < 8u; k++) {
            let offset = OFFSETS[k];
            var height = 0.0;
            if (!height_at(tile, texel + offset, &height)) {
                continue;
            }
            var slope = centre - height;
            if (offset.x != 0 && offset.y != 0) {
                slope = slope * 0.70710677;
            }
            if (slope > best) {
                best = slope;
                code = CODES[k];
            }
        }
    }
    textureStore(directions, texel, i32(id.z), vec4<f32>(f32(code) / 255.0, 0.0, 0.0, 1.0));
}
"#;

/// Steepest-descent direction per height texel, stored as a D8 code in the
/// red channel (see [`crate::kernel::D8_CODES`]). Neighbours across tile
/// edges are looked up in the input hash map. Tile `i` of the input list
/// lands in output layer `i`, and the output hash map says so.
pub struct D8DirectionsNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<D8Uniform>,
    capacity: usize,
    hash_map: Arc<RwLock<GpuHashMap>>,
    output: Option<Arc<RwLock<TileStorageTexture>>>,
}

impl D8DirectionsNode {
    pub fn new(ctx: Arc<GpuContext>, settings: D8Settings) -> Self {
        let source = format!("{HASH_MAP_WGSL}\n{D8_WGSL}");
        let pipeline = ComputePipeline::new(
            &ctx,
            "d8 directions",
            &source,
            "main",
            &[
                Binding::Uniform,
                Binding::Storage { read_only: true },
                Binding::Storage { read_only: true },
                Binding::Storage { read_only: true },
                Binding::UintTextureArray,
                Binding::StorageTextureArray { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "d8 params", D8Uniform::default());
        let hash_map = Arc::new(RwLock::new(GpuHashMap::new(&ctx, settings.capacity)));
        Self { ctx, pipeline, uniform, capacity: settings.capacity, hash_map, output: None }
    }

    fn output_storage(&mut self, heights: &TileStorageTexture) -> Result<Arc<RwLock<TileStorageTexture>>> {
        if let Some(out) = &self.output {
            if out.read().resolution() == heights.resolution() {
                return Ok(out.clone());
            }
        }
        let storage = TileStorageTexture::new(
            &self.ctx,
            "d8 directions",
            heights.resolution(),
            self.capacity,
            wgpu::TextureFormat::Rgba8Unorm,
        )?;
        let storage = Arc::new(RwLock::new(storage));
        self.output = Some(storage.clone());
        Ok(storage)
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let ids = inputs.tile_ids("tile ids")?;
        let heights = inputs.tile_storage("height textures")?;
        let height_map = inputs.hash_map("hash map")?;
        if ids.len() > self.capacity {
            return Err(ComputeError::CapacityExceeded {
                what: "d8 direction storage".into(),
                required: ids.len(),
                available: self.capacity,
            });
        }
        let tiles: Vec<Id> = ids.iter().map(|id| id.to(LOOKUP_SCHEME)).collect();

        let resolution = {
            let h = heights.read();
            if h.format() != wgpu::TextureFormat::R16Uint {
                return Err(ComputeError::InvalidInput(format!("d8 directions need R16Uint heights, got {:?}", h.format())));
            }
            h.resolution()
        };
        let output = {
            let h = heights.read();
            self.output_storage(&h)?
        };

        self.uniform.data = D8Uniform { resolution: resolution.to_array(), n_tiles: tiles.len() as u32, _pad: 0 };
        self.uniform.update_gpu_data(&self.ctx.queue);
        let tile_list = RawBuffer::<GpuTileId>::storage(&self.ctx, "d8 tile ids", tiles.len());
        if !tiles.is_empty() {
            tile_list.write(&self.ctx.queue, &tiles.iter().map(|id| GpuTileId::from(*id)).collect::<Vec<_>>());
        }

        {
            let h = heights.read();
            let lookup = height_map.read();
            let mut out = output.write();
            let mut map = self.hash_map.write();
            out.clear();
            map.clear();
            for (i, id) in tiles.iter().enumerate() {
                out.reserve_layer(i as u32)?;
                map.store(*id, i as u32)?;
            }
            map.update_gpu_data(&self.ctx)?;

            let bind_group = self.pipeline.bind_group(
                &self.ctx,
                &[
                    self.uniform.binding(),
                    tile_list.binding(),
                    lookup.key_binding(),
                    lookup.value_binding(),
                    wgpu::BindingResource::TextureView(&h.view),
                    wgpu::BindingResource::TextureView(&out.view),
                ],
            );
            let mut encoder = encoder(&self.ctx, "d8 directions");
            self.pipeline.dispatch(&mut encoder, &bind_group, UVec3::new(resolution.x, resolution.y, tiles.len() as u32));
            self.ctx.queue.submit(Some(encoder.finish()));
        }
        self.ctx.submitted_work_done().await?;
        tracing::debug!(tiles = tiles.len(), resolution = %resolution, "d8 directions computed");
        Ok(())
    }
}

impl Node for D8DirectionsNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        let output = self.output.clone()?;
        match index {
            0 => Some(Data::HashMap(self.hash_map.clone())),
            1 => Some(Data::TileStorage(output)),
            _ => None,
        }
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}
