use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[SocketSpec::new("texture", DataType::Texture)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", DataType::Texture)];

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FxaaUniform {
    /// Minimum local contrast that counts as an edge.
    pub edge_threshold: f32,
    /// Contrast floor for dark regions.
    pub edge_threshold_min: f32,
    /// Amount of sub-pixel aliasing removal, 0 to 1.
    pub subpixel_quality: f32,
    pub _pad: f32,
}

impl Default for FxaaUniform {
    fn default() -> Self {
        Self { edge_threshold: 0.125, edge_threshold_min: 0.0312, subpixel_quality: 0.75, _pad: 0.0 }
    }
}

const FXAA_WGSL: &str = r#"
struct Params {
    edge_threshold: f32,
    edge_threshold_min: f32,
    subpixel_quality: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var input: texture_2d<f32>;
@group(0) @binding(2) var input_sampler: sampler;
@group(0) @binding(3) var output: texture_storage_2d<rgba8unorm, write>;

fn luma(c: vec4<f32>) -> f32 {
    return dot(c.rgb, vec3<f32>(0.299, 0.587, 0.114)) * c.a;
}

fn sample(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(input, input_sampler, uv, 0.0);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(input);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let texel = 1.0 / vec2<f32>(size);
    let uv = (vec2<f32>(id.xy) + 0.5) * texel;

    let centre = sample(uv);
    let l_c = luma(centre);
    let l_n = luma(sample(uv + vec2<f32>(0.0, -texel.y)));
    let l_s = luma(sample(uv + vec2<f32>(0.0, texel.y)));
    let l_e = luma(sample(uv + vec2<f32>(texel.x, 0.0)));
    let l_w = luma(sample(uv + vec2<f32>(-texel.x, 0.0)));

    let l_min = min(l_c, min(min(l_n, l_s), min(l_e, l_w)));
    let l_max = max(l_c, max(max(l_n, l_s), max(l_e, l_w)));
    let range = l_max - l_min;
    if (range < max(params.edge_threshold_min, l_max * params.edge_threshold)) {
        textureStore(output, vec2<i32>(id.xy), centre);
        return;
    }

    let l_ne = luma(sample(uv + vec2<f32>(texel.x, -texel.y)));
    let l_nw = luma(sample(uv + vec2<f32>(-texel.x, -texel.y)));
    let l_se = luma(sample(uv + vec2<f32>(texel.x, texel.y)));
    let l_sw = luma(sample(uv + vec2<f32>(-texel.x, texel.y)));

    let horizontal = abs(l_nw + l_ne - 2.0 * l_n) + 2.0 * abs(l_w + l_e - 2.0 * l_c) + abs(l_sw + l_se - 2.0 * l_s);
    let vertical = abs(l_nw + l_sw - 2.0 * l_w) + 2.0 * abs(l_n + l_s - 2.0 * l_c) + abs(l_ne + l_se - 2.0 * l_e);
    let is_horizontal = horizontal >= vertical;

    // blend towards the neighbour across the edge with the larger gradient
    var step_uv = vec2<f32>(texel.x, 0.0);
    var l_pos = l_e;
    var l_neg = l_w;
    if (is_horizontal) {
        step_uv = vec2<f32>(0.0, texel.y);
        l_pos = l_s;
        l_neg = l_n;
    }
    if (abs(l_neg - l_c) > abs(l_pos - l_c)) {
        step_uv = -step_uv;
    }

    let average = (2.0 * (l_n + l_s + l_e + l_w) + l_ne + l_nw + l_se + l_sw) / 12.0;
    let sub = clamp(abs(average - l_c) / range, 0.0, 1.0);
    let sub_smooth = (-2.0 * sub + 3.0) * sub * sub;
    let blend = sub_smooth * sub_smooth * params.subpixel_quality * 0.5;

    textureStore(output, vec2<i32>(id.xy), sample(uv + step_uv * blend));
}
"#;

/// Fast approximate anti-aliasing of an RGBA8 texture.
pub struct FxaaNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<FxaaUniform>,
    output: Option<Arc<TextureWithSampler>>,
}

impl FxaaNode {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "fxaa",
            FXAA_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::Sampler,
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "fxaa params", FxaaUniform::default());
        Self { ctx, pipeline, uniform, output: None }
    }

    pub fn set_parameters(&mut self, parameters: FxaaUniform) {
        self.uniform.data = parameters;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let input = inputs.texture("texture")?;
        if input.format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(ComputeError::InvalidInput(format!("fxaa expects rgba8unorm, got {:?}", input.format)));
        }
        self.uniform.update_gpu_data(&self.ctx.queue);

        let output = TextureWithSampler::new(&self.ctx, "fxaa", input.size, wgpu::TextureFormat::Rgba8Unorm);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&input.view),
                wgpu::BindingResource::Sampler(&input.sampler),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "fxaa");
        self.pipeline.dispatch(&mut encoder, &bind_group, input.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for FxaaNode {
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
