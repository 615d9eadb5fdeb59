use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[SocketSpec::new("encoded texture", DataType::Texture)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("height texture", DataType::Texture)];

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HeightDecodeUniform {
    /// Metres per encoded unit.
    pub scale: f32,
    /// Datum in metres.
    pub offset: f32,
    pub _pad: [f32; 2],
}

impl Default for HeightDecodeUniform {
    fn default() -> Self {
        Self { scale: 0.1, offset: -1000.0, _pad: [0.0; 2] }
    }
}

const HEIGHT_DECODE_WGSL: &str = r#"
struct Params {
    scale: f32,
    offset: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var encoded: texture_2d<f32>;
@group(0) @binding(2) var heights: texture_storage_2d<r32float, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(encoded);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let rgb = round(textureLoad(encoded, vec2<i32>(id.xy), 0).rgb * 255.0);
    let h = (rgb.r * 65536.0 + rgb.g * 256.0 + rgb.b) * params.scale + params.offset;
    textureStore(heights, vec2<i32>(id.xy), vec4<f32>(h, 0.0, 0.0, 1.0));
}
"#;

/// RGB-packed elevation to `r32float` metres.
pub struct HeightDecodeNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<HeightDecodeUniform>,
    output: Option<Arc<TextureWithSampler>>,
}

impl HeightDecodeNode {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "height decode",
            HEIGHT_DECODE_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::StorageTexture { format: wgpu::TextureFormat::R32Float },
            ],
        );
        let uniform = Buffer::new(&ctx, "height decode params", HeightDecodeUniform::default());
        Self { ctx, pipeline, uniform, output: None }
    }

    pub fn set_datum(&mut self, scale: f32, offset: f32) {
        self.uniform.data.scale = scale;
        self.uniform.data.offset = offset;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let encoded = inputs.texture("encoded texture")?;
        let output = TextureWithSampler::new(&self.ctx, "decoded heights", encoded.size, wgpu::TextureFormat::R32Float);
        self.uniform.update_gpu_data(&self.ctx.queue);

        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&encoded.view),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "height decode");
        self.pipeline.dispatch(&mut encoder, &bind_group, encoded.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for HeightDecodeNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, _index: usize) -> Option<Data> {
        self.output.clone().map(Data::Texture)
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use glam::UVec2;
    use tile_core::encode_height_rgb;

    #[tokio::test]
    async fn packed_heights_decode_to_metres() {
        let Some(ctx) = context().await else { return };
        let heights = [0.0f32, 1234.5, 3798.0, -12.3];
        let texels: Vec<u8> = heights.iter().flat_map(|h| { let [r, g, b] = encode_height_rgb(*h); [r, g, b, 255] }).collect();
        let encoded = TextureWithSampler::new(&ctx, "encoded", UVec2::new(2, 2), wgpu::TextureFormat::Rgba8Unorm);
        encoded.write(&ctx, &texels);

        let mut node = HeightDecodeNode::new(ctx.clone());
        node.run(Inputs::new(INPUTS, vec![Data::Texture(Arc::new(encoded))])).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        let decoded = out.read_back_f32(&ctx).await.unwrap();
        for (a, b) in heights.iter().zip(decoded) {
            assert!((a - b).abs() <= 0.05, "{a} vs {b}");
        }
    }
}
