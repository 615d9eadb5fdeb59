use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use glam::UVec2;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[SocketSpec::new("normal texture", DataType::Texture)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("release point texture", DataType::Texture)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleasePointsSettings {
    pub min_slope_angle_deg: f32,
    pub max_slope_angle_deg: f32,
    /// Only every n-th texel along each axis is a candidate.
    pub sampling_interval: UVec2,
}

impl Default for ReleasePointsSettings {
    fn default() -> Self {
        Self { min_slope_angle_deg: 30.0, max_slope_angle_deg: 45.0, sampling_interval: UVec2::splat(8) }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct ReleasePointsUniform {
    min_slope_angle: f32,
    max_slope_angle: f32,
    sampling_interval: [u32; 2],
}

const RELEASE_POINTS_WGSL: &str = r#"
struct Params {
    min_slope_angle: f32,
    max_slope_angle: f32,
    sampling_interval: vec2<u32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var normals: texture_2d<f32>;
@group(0) @binding(2) var release: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(normals);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let texel = vec2<i32>(id.xy);
    var out = vec4<f32>(0.0);
    if (id.x % params.sampling_interval.x == 0u && id.y % params.sampling_interval.y == 0u) {
        let n = normalize(textureLoad(normals, texel, 0).xyz * 2.0 - 1.0);
        let angle = degrees(acos(clamp(n.z, -1.0, 1.0)));
        if (angle >= params.min_slope_angle && angle <= params.max_slope_angle) {
            out = vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    }
    textureStore(release, texel, out);
}
"#;

/// Marks texels on a regular grid whose slope lies inside the release band.
pub struct ComputeReleasePointsNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<ReleasePointsUniform>,
    settings: ReleasePointsSettings,
    output: Option<Arc<TextureWithSampler>>,
}

impl ComputeReleasePointsNode {
    pub fn new(ctx: Arc<GpuContext>, settings: ReleasePointsSettings) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "release points",
            RELEASE_POINTS_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "release points params", ReleasePointsUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    pub fn set_settings(&mut self, settings: ReleasePointsSettings) {
        self.settings = settings;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let normals = inputs.texture("normal texture")?;
        self.uniform.data = ReleasePointsUniform {
            min_slope_angle: self.settings.min_slope_angle_deg,
            max_slope_angle: self.settings.max_slope_angle_deg,
            sampling_interval: self.settings.sampling_interval.max(UVec2::ONE).to_array(),
        };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let output = TextureWithSampler::new(&self.ctx, "release points", normals.size, wgpu::TextureFormat::Rgba8Unorm);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&normals.view),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "release points");
        self.pipeline.dispatch(&mut encoder, &bind_group, normals.size.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for ComputeReleasePointsNode {
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

    #[tokio::test]
    async fn only_grid_points_in_the_slope_band_are_released() {
        let Some(ctx) = context().await else { return };
        let size = UVec2::splat(16);
        // 35 degree slope facing east
        let a = 35.0f32.to_radians();
        let texel = [((a.sin() + 1.0) * 127.5) as u8, 128, ((a.cos() + 1.0) * 127.5) as u8, 255];
        let normals = TextureWithSampler::new(&ctx, "normals", size, wgpu::TextureFormat::Rgba8Unorm);
        normals.write(&ctx, &texel.repeat(256));

        let mut node = ComputeReleasePointsNode::new(ctx.clone(), ReleasePointsSettings::default());
        node.run(Inputs::new(INPUTS, vec![Data::Texture(Arc::new(normals))])).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        let released: Vec<usize> = out.read_back(&ctx).await.unwrap().chunks(4).enumerate().filter(|(_, t)| t[0] == 255).map(|(i, _)| i).collect();
        assert_eq!(released, vec![0, 8, 128, 136]);

        node.set_settings(ReleasePointsSettings { min_slope_angle_deg: 40.0, ..Default::default() });
        let normals = TextureWithSampler::new(&ctx, "normals", size, wgpu::TextureFormat::Rgba8Unorm);
        normals.write(&ctx, &texel.repeat(256));
        node.run(Inputs::new(INPUTS, vec![Data::Texture(Arc::new(normals))])).await.unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        assert!(out.read_back(&ctx).await.unwrap().chunks(4).all(|t| t[0] == 0));
    }
}
