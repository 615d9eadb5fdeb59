use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::{encoder, texel_size_m};
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("region aabb", DataType::Aabb2),
    SocketSpec::new("height texture", DataType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("normal texture", DataType::Texture)];

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct NormalsUniform {
    texel_size_m: [f32; 2],
    size: [u32; 2],
}

const NORMALS_WGSL: &str = r#"
struct Params {
    texel_size_m: vec2<f32>,
    size: vec2<u32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var heights: texture_2d<f32>;
@group(0) @binding(2) var normals: texture_storage_2d<rgba8unorm, write>;

fn height_at(p: vec2<i32>) -> f32 {
    let c = clamp(p, vec2<i32>(0), vec2<i32>(params.size) - vec2<i32>(1));
    return textureLoad(heights, c, 0).r;
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size.x || id.y >= params.size.y) {
        return;
    }
    let p = vec2<i32>(id.xy);
    let dx = (height_at(p + vec2<i32>(1, 0)) - height_at(p - vec2<i32>(1, 0))) / (2.0 * params.texel_size_m.x);
    // rows grow southwards
    let dy = (height_at(p - vec2<i32>(0, 1)) - height_at(p + vec2<i32>(0, 1))) / (2.0 * params.texel_size_m.y);
    let n = normalize(vec3<f32>(-dx, -dy, 1.0));
    textureStore(normals, p, vec4<f32>(0.5 * (n + vec3<f32>(1.0)), 1.0));
}
"#;

/// Surface normals of an `r32float` height texture, packed as `0.5 * (n + 1)`.
pub struct ComputeNormalsNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<NormalsUniform>,
    output: Option<Arc<TextureWithSampler>>,
}

impl ComputeNormalsNode {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "normals",
            NORMALS_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: false },
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "normals params", NormalsUniform::default());
        Self { ctx, pipeline, uniform, output: None }
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let region = inputs.aabb2("region aabb")?;
        let heights = inputs.texture("height texture")?;
        let output = TextureWithSampler::new(&self.ctx, "normals", heights.size, wgpu::TextureFormat::Rgba8Unorm);

        self.uniform.data = NormalsUniform {
            texel_size_m: texel_size_m(&region, heights.size).to_array(),
            size: heights.size.to_array(),
        };
        self.uniform.update_gpu_data(&self.ctx.queue);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&heights.view),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "normals");
        self.pipeline.dispatch(&mut encoder, &bind_group, heights.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for ComputeNormalsNode {
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

/// Unpacks an RGBA8 normal texel.
pub fn decode_normal(texel: [u8; 4]) -> glam::Vec3 {
    glam::Vec3::new(texel[0] as f32, texel[1] as f32, texel[2] as f32) / 127.5 - glam::Vec3::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use glam::{DVec2, UVec2};
    use tile_core::Aabb2;

    #[tokio::test]
    async fn flat_ground_points_up() {
        let Some(ctx) = context().await else { return };
        let size = UVec2::new(8, 8);
        let heights = TextureWithSampler::new(&ctx, "heights", size, wgpu::TextureFormat::R32Float);
        heights.write(&ctx, bytemuck::cast_slice(&vec![500.0f32; 64]));
        let region = Aabb2::new(DVec2::ZERO, DVec2::splat(80.0));

        let mut node = ComputeNormalsNode::new(ctx.clone());
        node.run(Inputs::new(INPUTS, vec![Data::Aabb2(region), Data::Texture(Arc::new(heights))])).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        let texels = out.read_back(&ctx).await.unwrap();
        let n = decode_normal([texels[0], texels[1], texels[2], texels[3]]);
        assert!((n - glam::Vec3::Z).length() < 0.02);
    }

    #[test]
    fn packed_normals_unpack() {
        let n = decode_normal([255, 128, 128, 255]);
        assert!((n - glam::Vec3::X).length() < 0.01);
    }
}
