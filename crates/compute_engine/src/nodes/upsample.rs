use crate::buffer::{Buffer, RawBuffer};
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::storage::TileStorageTexture;
use futures::future::BoxFuture;
use glam::{UVec2, UVec3};
use parking_lot::RwLock;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[SocketSpec::new("source textures", DataType::TileStorage)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("output textures", DataType::TileStorage)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsampleSettings {
    pub target_resolution: UVec2,
}

impl Default for UpsampleSettings {
    fn default() -> Self {
        Self { target_resolution: UVec2::splat(512) }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct UpsampleUniform {
    target_resolution: [u32; 2],
    n_layers: u32,
    _pad: u32,
}

const UPSAMPLE_WGSL: &str = r#"
struct Params {
    target_resolution: vec2<u32>,
    n_layers: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source: texture_2d_array<f32>;
@group(0) @binding(2) var source_sampler: sampler;
@group(0) @binding(3) var<storage, read> layers: array<u32>;
@group(0) @binding(4) var upsampled: texture_storage_2d_array<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.target_resolution.x || id.y >= params.target_resolution.y || id.z >= params.n_layers) {
        return;
    }
    let layer = i32(layers[id.z]);
    let uv = (vec2<f32>(id.xy) + vec2<f32>(0.5)) / vec2<f32>(params.target_resolution);
    let colour = textureSampleLevel(source, source_sampler, uv, layer, 0.0);
    textureStore(upsampled, vec2<i32>(id.xy), layer, colour);
}
"#;

/// Bilinearly resamples every used layer of a tile storage texture into a
/// storage texture of higher resolution. Layer indices are preserved, so a
/// hash map built for the source is valid for the output too.
pub struct UpsampleTexturesNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<UpsampleUniform>,
    settings: UpsampleSettings,
    output: Option<Arc<RwLock<TileStorageTexture>>>,
}

impl UpsampleTexturesNode {
    pub fn new(ctx: Arc<GpuContext>, settings: UpsampleSettings) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "upsample textures",
            UPSAMPLE_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::TextureArray,
                Binding::Sampler,
                Binding::Storage { read_only: true },
                Binding::StorageTextureArray { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "upsample params", UpsampleUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    /// Reuses the previous output texture when it still has the right shape.
    fn output_storage(&mut self, capacity: usize) -> Result<Arc<RwLock<TileStorageTexture>>> {
        if let Some(out) = &self.output {
            let o = out.read();
            if o.capacity() == capacity && o.resolution() == self.settings.target_resolution {
                return Ok(out.clone());
            }
        }
        let storage = TileStorageTexture::new(
            &self.ctx,
            "upsampled tiles",
            self.settings.target_resolution,
            capacity,
            wgpu::TextureFormat::Rgba8Unorm,
        )?;
        let storage = Arc::new(RwLock::new(storage));
        self.output = Some(storage.clone());
        Ok(storage)
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let source = inputs.tile_storage("source textures")?;
        let (capacity, layers, format) = {
            let s = source.read();
            (s.capacity(), s.used_layers().collect::<Vec<_>>(), s.format())
        };
        if format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(ComputeError::InvalidInput(format!("cannot upsample {format:?} tiles")));
        }
        let output = self.output_storage(capacity)?;

        self.uniform.data = UpsampleUniform {
            target_resolution: self.settings.target_resolution.to_array(),
            n_layers: layers.len() as u32,
            _pad: 0,
        };
        self.uniform.update_gpu_data(&self.ctx.queue);
        let layer_list = RawBuffer::<u32>::storage(&self.ctx, "upsample layers", layers.len());
        if !layers.is_empty() {
            layer_list.write(&self.ctx.queue, &layers);
        }

        {
            let src = source.read();
            let mut out = output.write();
            out.clear();
            for layer in &layers {
                out.reserve_layer(*layer)?;
            }
            let bind_group = self.pipeline.bind_group(
                &self.ctx,
                &[
                    self.uniform.binding(),
                    wgpu::BindingResource::TextureView(&src.view),
                    wgpu::BindingResource::Sampler(&src.sampler),
                    layer_list.binding(),
                    wgpu::BindingResource::TextureView(&out.view),
                ],
            );
            let mut encoder = encoder(&self.ctx, "upsample textures");
            let extent = UVec3::new(self.settings.target_resolution.x, self.settings.target_resolution.y, layers.len() as u32);
            self.pipeline.dispatch(&mut encoder, &bind_group, extent);
            self.ctx.queue.submit(Some(encoder.finish()));
        }
        self.ctx.submitted_work_done().await?;
        tracing::debug!(layers = layers.len(), resolution = %self.settings.target_resolution, "tiles upsampled");
        Ok(())
    }
}

impl Node for UpsampleTexturesNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, _index: usize) -> Option<Data> {
        self.output.clone().map(Data::TileStorage)
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::tests::context;
    use crate::texture::TextureWithSampler;

    /// Copies one array layer into a plain texture and reads it back.
    pub(crate) async fn read_layer(ctx: &GpuContext, storage: &TileStorageTexture, layer: u32) -> Vec<u8> {
        let size = storage.resolution();
        let plain = TextureWithSampler::new(ctx, "layer copy", size, storage.format());
        let mut encoder = encoder(ctx, "layer copy");
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            plain.texture.as_image_copy(),
            wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: 1 },
        );
        ctx.queue.submit(Some(encoder.finish()));
        plain.read_back(ctx).await.unwrap()
    }

    #[tokio::test]
    async fn used_layers_keep_their_index() {
        let Some(ctx) = context().await else { return };
        let mut source = TileStorageTexture::new(&ctx, "source", UVec2::splat(4), 4, wgpu::TextureFormat::Rgba8Unorm).unwrap();
        source.reserve_layer(2).unwrap();
        source.write_layer(&ctx, 2, &[200, 100, 50, 255].repeat(16));
        let source = Arc::new(RwLock::new(source));

        let mut node = UpsampleTexturesNode::new(ctx.clone(), UpsampleSettings { target_resolution: UVec2::splat(8) });
        node.run(Inputs::new(INPUTS, vec![Data::TileStorage(source)])).await.unwrap();

        let Some(Data::TileStorage(out)) = node.output(0) else { panic!("no output") };
        let out = out.read();
        assert_eq!(out.used_layers().collect::<Vec<_>>(), vec![2]);
        assert_eq!(out.resolution(), UVec2::splat(8));
        let texels = read_layer(&ctx, &out, 2).await;
        assert!(texels.chunks(4).all(|t| t == [200, 100, 50, 255]));
    }

    #[tokio::test]
    async fn elevation_tiles_are_rejected() {
        let Some(ctx) = context().await else { return };
        let source = TileStorageTexture::new(&ctx, "source", UVec2::splat(4), 1, wgpu::TextureFormat::R16Uint).unwrap();
        let mut node = UpsampleTexturesNode::new(ctx, UpsampleSettings::default());
        let result = node.run(Inputs::new(INPUTS, vec![Data::TileStorage(Arc::new(RwLock::new(source)))])).await;
        assert!(matches!(result, Err(ComputeError::InvalidInput(_))));
    }
}
