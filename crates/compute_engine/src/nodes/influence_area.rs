use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::{encoder, texel_size_m};
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use glam::{DVec2, UVec2, Vec2};
use std::sync::Arc;
use tile_core::Aabb2;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("region aabb", DataType::Aabb2),
    SocketSpec::new("normal texture", DataType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("influence texture", DataType::Texture)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfluenceAreaSettings {
    /// World position whose upslope catchment is wanted.
    pub target: DVec2,
    pub radius_m: f32,
    pub num_steps: u32,
    /// In texels.
    pub step_length: f32,
}

impl Default for InfluenceAreaSettings {
    fn default() -> Self {
        Self { target: DVec2::ZERO, radius_m: 20.0, num_steps: 1024, step_length: 0.5 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct InfluenceAreaUniform {
    target_texel: [f32; 2],
    radius_texels: f32,
    num_steps: u32,
    step_length: f32,
    _pad: [f32; 3],
}

const INFLUENCE_AREA_WGSL: &str = r#"
struct Params {
    target_texel: vec2<f32>,
    radius_texels: f32,
    num_steps: u32,
    step_length: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var normals: texture_2d<f32>;
@group(0) @binding(2) var normals_sampler: sampler;
@group(0) @binding(3) var influence: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(normals);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let extent = vec2<f32>(size);
    var p = vec2<f32>(id.xy) + vec2<f32>(0.5);
    var hit = 0.0;
    for (var i = 0u; i < params.num_steps; i++) {
        if (distance(p, params.target_texel) <= params.radius_texels) {
            hit = 1.0 - f32(i) / f32(params.num_steps);
            break;
        }
        let n = textureSampleLevel(normals, normals_sampler, p / extent, 0.0).xyz * 2.0 - 1.0;
        let downhill = vec2<f32>(n.x, -n.y);
        if (length(downhill) < 1e-6) {
            break;
        }
        p += normalize(downhill) * params.step_length;
        if (any(p < vec2<f32>(0.0)) || any(p >= extent)) {
            break;
        }
    }
    var colour = vec4<f32>(0.0);
    if (hit > 0.0) {
        colour = vec4<f32>(1.0, 0.3, 0.0, max(hit, 0.25));
    }
    textureStore(influence, vec2<i32>(id.xy), colour);
}
"#;

/// Marks every texel whose steepest-descent path reaches the target,
/// fading with the number of steps it takes.
pub struct ComputeInfluenceAreaNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<InfluenceAreaUniform>,
    settings: InfluenceAreaSettings,
    output: Option<Arc<TextureWithSampler>>,
}

/// Position of `world` in the texel space of a north-up raster over `region`.
fn world_to_texel(region: &Aabb2, size: UVec2, world: DVec2) -> Vec2 {
    let uv = (world - region.min) / region.size();
    (DVec2::new(uv.x, 1.0 - uv.y) * size.as_dvec2()).as_vec2()
}

impl ComputeInfluenceAreaNode {
    pub fn new(ctx: Arc<GpuContext>, settings: InfluenceAreaSettings) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "influence area",
            INFLUENCE_AREA_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::Sampler,
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "influence area params", InfluenceAreaUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    pub fn set_target(&mut self, target: DVec2) {
        self.settings.target = target;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let region = inputs.aabb2("region aabb")?;
        let normals = inputs.texture("normal texture")?;
        if !region.contains(self.settings.target) {
            return Err(ComputeError::InvalidInput(format!(
                "influence target {} lies outside the region",
                self.settings.target
            )));
        }
        let texel = texel_size_m(&region, normals.size);
        self.uniform.data = InfluenceAreaUniform {
            target_texel: world_to_texel(&region, normals.size, self.settings.target).to_array(),
            radius_texels: self.settings.radius_m / texel.min_element().max(f32::EPSILON),
            num_steps: self.settings.num_steps,
            step_length: self.settings.step_length,
            _pad: [0.0; 3],
        };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let output = TextureWithSampler::new(&self.ctx, "influence area", normals.size, wgpu::TextureFormat::Rgba8Unorm);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&normals.view),
                wgpu::BindingResource::Sampler(&normals.sampler),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "influence area");
        self.pipeline.dispatch(&mut encoder, &bind_group, normals.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for ComputeInfluenceAreaNode {
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

    #[test]
    fn world_points_map_to_north_up_texels() {
        let region = Aabb2::new(DVec2::new(100.0, 200.0), DVec2::new(420.0, 360.0));
        let size = UVec2::new(32, 16);
        assert_eq!(world_to_texel(&region, size, DVec2::new(100.0, 360.0)), Vec2::ZERO);
        assert_eq!(world_to_texel(&region, size, DVec2::new(420.0, 200.0)), Vec2::new(32.0, 16.0));
    }

    #[tokio::test]
    async fn upslope_texels_on_the_fall_line_are_marked() {
        let Some(ctx) = context().await else { return };
        let size = UVec2::new(32, 16);
        // 30 degrees falling east
        let a = 30.0f32.to_radians();
        let texel = [((a.sin() + 1.0) * 127.5) as u8, 128, ((a.cos() + 1.0) * 127.5) as u8, 255];
        let normals = TextureWithSampler::new(&ctx, "normals", size, wgpu::TextureFormat::Rgba8Unorm);
        normals.write(&ctx, &texel.repeat(512));
        // equator, 10 m texels
        let region = Aabb2::new(DVec2::new(0.0, -80.0), DVec2::new(320.0, 80.0));
        let settings = InfluenceAreaSettings { target: DVec2::new(205.0, -5.0), ..Default::default() };

        let mut node = ComputeInfluenceAreaNode::new(ctx.clone(), settings);
        node.run(Inputs::new(INPUTS, vec![Data::Aabb2(region), Data::Texture(Arc::new(normals))])).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        let texels = out.read_back(&ctx).await.unwrap();
        let alpha = |x: u32, y: u32| texels[((y * size.x + x) * 4 + 3) as usize];
        assert!(alpha(5, 8) > 0);
        assert_eq!(alpha(25, 8), 0);
        assert_eq!(alpha(5, 2), 0);
    }
}
