use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::{ensure_same_size, TextureWithSampler};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("region aabb", DataType::Aabb2),
    SocketSpec::new("normal texture", DataType::Texture),
    SocketSpec::new("height texture", DataType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("snow texture", DataType::Texture)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowSettings {
    /// Slopes flatter than this hold no snow, in degrees.
    pub min_angle: f32,
    /// Slopes steeper than this hold no snow, in degrees.
    pub max_angle: f32,
    /// Width of the fade below `max_angle`, in degrees.
    pub angle_blend: f32,
    /// Snow line in metres.
    pub min_altitude: f32,
    /// Amplitude of the noise applied to the snow line, in metres.
    pub altitude_variation: f32,
    /// Height band over which cover fades in, in metres.
    pub altitude_blend: f32,
    pub specular: f32,
}

impl Default for SnowSettings {
    fn default() -> Self {
        Self {
            min_angle: 0.0,
            max_angle: 45.0,
            angle_blend: 0.0,
            min_altitude: 1000.0,
            altitude_variation: 200.0,
            altitude_blend: 200.0,
            specular: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct SnowUniform {
    region_min: [f32; 2],
    region_size: [f32; 2],
    min_angle: f32,
    max_angle: f32,
    angle_blend: f32,
    min_altitude: f32,
    altitude_variation: f32,
    altitude_blend: f32,
    specular: f32,
    _pad: f32,
}

const SNOW_WGSL: &str = r#"
struct Params {
    region_min: vec2<f32>,
    region_size: vec2<f32>,
    min_angle: f32,
    max_angle: f32,
    angle_blend: f32,
    min_altitude: f32,
    altitude_variation: f32,
    altitude_blend: f32,
    specular: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var normals: texture_2d<f32>;
@group(0) @binding(2) var heights: texture_2d<f32>;
@group(0) @binding(3) var snow: texture_storage_2d<rgba8unorm, write>;

const NOISE_CELL_M: f32 = 250.0;

fn hash2(p: vec2<f32>) -> f32 {
    let q = fract(p * vec2<f32>(0.1031, 0.1030));
    let r = q + dot(q, q.yx + 33.33);
    return fract((r.x + r.y) * r.x);
}

// value noise in [-1, 1]
fn noise(p: vec2<f32>) -> f32 {
    let i = floor(p);
    let f = fract(p);
    let u = f * f * (3.0 - 2.0 * f);
    let a = hash2(i);
    let b = hash2(i + vec2<f32>(1.0, 0.0));
    let c = hash2(i + vec2<f32>(0.0, 1.0));
    let d = hash2(i + vec2<f32>(1.0, 1.0));
    return mix(mix(a, b, u.x), mix(c, d, u.x), u.y) * 2.0 - 1.0;
}

fn fade_in(lo: f32, hi: f32, x: f32) -> f32 {
    if (hi <= lo) {
        return select(0.0, 1.0, x >= lo);
    }
    return smoothstep(lo, hi, x);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(heights);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let texel = vec2<i32>(id.xy);
    let n = textureLoad(normals, texel, 0).xyz * 2.0 - 1.0;
    let h = textureLoad(heights, texel, 0).r;
    let angle = degrees(acos(clamp(normalize(n).z, -1.0, 1.0)));

    let uv = (vec2<f32>(id.xy) + 0.5) / vec2<f32>(size);
    let world = params.region_min + vec2<f32>(uv.x, 1.0 - uv.y) * params.region_size;
    let snow_line = params.min_altitude + params.altitude_variation * noise(world / NOISE_CELL_M);

    let altitude_gate = fade_in(snow_line, snow_line + params.altitude_blend, h);
    let slope_gate = (1.0 - fade_in(params.max_angle - params.angle_blend, params.max_angle, angle))
        * select(0.0, 1.0, angle >= params.min_angle);
    let cover = altitude_gate * slope_gate;
    textureStore(snow, texel, vec4<f32>(vec3<f32>(cover), cover * params.specular));
}
"#;

/// Snow cover mask from altitude and slope. Colour is premultiplied, alpha
/// carries the specular strength.
pub struct ComputeSnowNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<SnowUniform>,
    settings: SnowSettings,
    output: Option<Arc<TextureWithSampler>>,
}

impl ComputeSnowNode {
    pub fn new(ctx: Arc<GpuContext>, settings: SnowSettings) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "snow",
            SNOW_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::Texture { filterable: false },
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "snow params", SnowUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    pub fn settings(&self) -> &SnowSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SnowSettings) {
        self.settings = settings;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let region = inputs.aabb2("region aabb")?;
        let normals = inputs.texture("normal texture")?;
        let heights = inputs.texture("height texture")?;
        ensure_same_size("snow", &normals, &heights)?;

        let s = self.settings;
        self.uniform.data = SnowUniform {
            region_min: region.min.as_vec2().to_array(),
            region_size: region.size().as_vec2().to_array(),
            min_angle: s.min_angle,
            max_angle: s.max_angle,
            angle_blend: s.angle_blend,
            min_altitude: s.min_altitude,
            altitude_variation: s.altitude_variation,
            altitude_blend: s.altitude_blend,
            specular: s.specular,
            _pad: 0.0,
        };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let output = TextureWithSampler::new(&self.ctx, "snow", heights.size, wgpu::TextureFormat::Rgba8Unorm);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&normals.view),
                wgpu::BindingResource::TextureView(&heights.view),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "snow");
        self.pipeline.dispatch(&mut encoder, &bind_group, heights.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for ComputeSnowNode {
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
    use crate::error::ComputeError;
    use glam::{DVec2, UVec2};
    use tile_core::Aabb2;

    fn flat(ctx: &GpuContext, size: UVec2, height: f32) -> (Arc<TextureWithSampler>, Arc<TextureWithSampler>) {
        let n = (size.x * size.y) as usize;
        let normals = TextureWithSampler::new(ctx, "normals", size, wgpu::TextureFormat::Rgba8Unorm);
        normals.write(ctx, &[128, 128, 255, 255].repeat(n));
        let heights = TextureWithSampler::new(ctx, "heights", size, wgpu::TextureFormat::R32Float);
        heights.write(ctx, bytemuck::cast_slice(&vec![height; n]));
        (Arc::new(normals), Arc::new(heights))
    }

    async fn cover(ctx: Arc<GpuContext>, height: f32) -> Vec<u8> {
        let (normals, heights) = flat(&ctx, UVec2::splat(16), height);
        let region = Aabb2::new(DVec2::new(1.0e6, 5.0e6), DVec2::new(1.0e6 + 1600.0, 5.0e6 + 1600.0));
        let mut node = ComputeSnowNode::new(ctx.clone(), SnowSettings::default());
        let inputs = Inputs::new(INPUTS, vec![Data::Aabb2(region), Data::Texture(normals), Data::Texture(heights)]);
        node.run(inputs).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        out.read_back(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn snow_line_gates_cover() {
        let Some(ctx) = context().await else { return };
        assert!(cover(ctx.clone(), 3000.0).await.chunks(4).all(|t| t[0] == 255));
        assert!(cover(ctx, 200.0).await.chunks(4).all(|t| t[0] == 0));
    }

    #[tokio::test]
    async fn mismatched_inputs_fail() {
        let Some(ctx) = context().await else { return };
        let (normals, _) = flat(&ctx, UVec2::splat(8), 0.0);
        let (_, heights) = flat(&ctx, UVec2::splat(4), 0.0);
        let mut node = ComputeSnowNode::new(ctx, SnowSettings::default());
        let region = Aabb2::new(DVec2::ZERO, DVec2::ONE);
        let inputs = Inputs::new(INPUTS, vec![Data::Aabb2(region), Data::Texture(normals), Data::Texture(heights)]);
        assert!(matches!(node.run(inputs).await, Err(ComputeError::InvalidInput(_))));
    }
}
