use crate::buffer::{Buffer, RawBuffer};
use crate::context::GpuContext;
use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::{ensure_same_size, TextureWithSampler};
use futures::future::BoxFuture;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("height texture", DataType::Texture),
    SocketSpec::new("release point texture", DataType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", DataType::Texture)];

/// Fixed-point units per unit of flux.
const FLUX_SCALE: f32 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeSimulationSettings {
    pub max_num_iterations: u32,
    /// Accumulated flux shown at full intensity.
    pub display_max_flux: f32,
}

impl Default for IterativeSimulationSettings {
    fn default() -> Self {
        Self { max_num_iterations: 16, display_max_flux: 4.0 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct IterativeSimulationUniform {
    size: [u32; 2],
    flux_scale: f32,
    display_max_flux: f32,
}

const ITERATIVE_SIMULATION_WGSL: &str = r#"
struct Params {
    size: vec2<u32>,
    flux_scale: f32,
    display_max_flux: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var heights: texture_2d<f32>;
@group(0) @binding(2) var release: texture_2d<f32>;
@group(0) @binding(3) var<storage, read_write> total: array<atomic<u32>>;
@group(0) @binding(4) var<storage, read_write> pending: array<atomic<u32>>;
@group(0) @binding(5) var<storage, read_write> pending_next: array<atomic<u32>>;
@group(0) @binding(6) var flux: texture_storage_2d<rgba8unorm, write>;

fn index(p: vec2<u32>) -> u32 {
    return p.y * params.size.x + p.x;
}

@compute @workgroup_size(16, 16, 1)
fn seed(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size.x || id.y >= params.size.y) {
        return;
    }
    if (textureLoad(release, vec2<i32>(id.xy), 0).r >= 0.5) {
        let unit = u32(params.flux_scale);
        atomicStore(&pending[index(id.xy)], unit);
        atomicStore(&total[index(id.xy)], unit);
    }
}

// Moves the pending flux of every cell to its lower neighbours, weighted by slope.
@compute @workgroup_size(16, 16, 1)
fn iterate(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size.x || id.y >= params.size.y) {
        return;
    }
    let amount = atomicLoad(&pending[index(id.xy)]);
    if (amount == 0u) {
        return;
    }
    var offsets = array<vec2<i32>, 8>(
        vec2<i32>(0, -1), vec2<i32>(1, -1), vec2<i32>(1, 0), vec2<i32>(1, 1),
        vec2<i32>(0, 1), vec2<i32>(-1, 1), vec2<i32>(-1, 0), vec2<i32>(-1, -1),
    );
    let c = vec2<i32>(id.xy);
    let h = textureLoad(heights, c, 0).r;
    var slopes: array<f32, 8>;
    var sum = 0.0;
    for (var k = 0u; k < 8u; k++) {
        let n = c + offsets[k];
        slopes[k] = 0.0;
        if (any(n < vec2<i32>(0)) || any(n >= vec2<i32>(params.size))) {
            continue;
        }
        let dist = length(vec2<f32>(offsets[k]));
        let s = (h - textureLoad(heights, n, 0).r) / dist;
        if (s > 0.0) {
            slopes[k] = s;
            sum += s;
        }
    }
    if (sum <= 0.0) {
        return;
    }
    for (var k = 0u; k < 8u; k++) {
        if (slopes[k] <= 0.0) {
            continue;
        }
        let share = u32(f32(amount) * slopes[k] / sum);
        if (share > 0u) {
            let j = index(vec2<u32>(c + offsets[k]));
            atomicAdd(&pending_next[j], share);
            atomicAdd(&total[j], share);
        }
    }
}

@compute @workgroup_size(16, 16, 1)
fn finish(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size.x || id.y >= params.size.y) {
        return;
    }
    let amount = f32(atomicLoad(&total[index(id.xy)])) / params.flux_scale;
    var colour = vec4<f32>(0.0);
    if (amount > 0.0) {
        let t = clamp(log2(1.0 + amount) / log2(1.0 + params.display_max_flux), 0.0, 1.0);
        colour = vec4<f32>(mix(vec3<f32>(1.0, 0.9, 0.2), vec3<f32>(0.8, 0.0, 0.1), t), max(t, 0.2));
    }
    textureStore(flux, vec2<i32>(id.xy), colour);
}
"#;

/// Iterative multiple-flow-direction routing of flux released at the
/// release points. Every iteration moves the pending flux one cell downhill.
pub struct IterativeSimulationNode {
    ctx: Arc<GpuContext>,
    seed: ComputePipeline,
    iterate: ComputePipeline,
    finish: ComputePipeline,
    uniform: Buffer<IterativeSimulationUniform>,
    settings: IterativeSimulationSettings,
    output: Option<Arc<TextureWithSampler>>,
}

impl IterativeSimulationNode {
    pub fn new(ctx: Arc<GpuContext>, settings: IterativeSimulationSettings) -> Self {
        let storage = Binding::Storage { read_only: false };
        let bindings = [
            Binding::Uniform,
            Binding::Texture { filterable: false },
            Binding::Texture { filterable: true },
            storage,
            storage,
            storage,
            Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
        ];
        let pipeline = |entry_point| {
            ComputePipeline::new(&ctx, "iterative simulation", ITERATIVE_SIMULATION_WGSL, entry_point, &bindings)
        };
        let (seed, iterate, finish) = (pipeline("seed"), pipeline("iterate"), pipeline("finish"));
        let uniform = Buffer::new(&ctx, "iterative simulation params", IterativeSimulationUniform::default());
        Self { ctx, seed, iterate, finish, uniform, settings, output: None }
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let heights = inputs.texture("height texture")?;
        let release = inputs.texture("release point texture")?;
        ensure_same_size("iterative simulation", &heights, &release)?;
        let size = heights.size;
        let n = (size.x * size.y) as usize;

        self.uniform.data = IterativeSimulationUniform {
            size: size.to_array(),
            flux_scale: FLUX_SCALE,
            display_max_flux: self.settings.display_max_flux,
        };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let total = RawBuffer::<u32>::storage(&self.ctx, "flux total", n);
        let pending = [
            RawBuffer::<u32>::storage(&self.ctx, "flux pending a", n),
            RawBuffer::<u32>::storage(&self.ctx, "flux pending b", n),
        ];
        let output = TextureWithSampler::new(&self.ctx, "flux", size, wgpu::TextureFormat::Rgba8Unorm);

        // bind groups per direction: [0] reads a writes b, [1] the reverse
        let bind_groups = |pipeline: &ComputePipeline| {
            [(0, 1), (1, 0)].map(|(from, to): (usize, usize)| {
                pipeline.bind_group(
                    &self.ctx,
                    &[
                        self.uniform.binding(),
                        wgpu::BindingResource::TextureView(&heights.view),
                        wgpu::BindingResource::TextureView(&release.view),
                        total.binding(),
                        pending[from].binding(),
                        pending[to].binding(),
                        wgpu::BindingResource::TextureView(&output.view),
                    ],
                )
            })
        };
        let seed_groups = bind_groups(&self.seed);
        let iterate_groups = bind_groups(&self.iterate);
        let finish_groups = bind_groups(&self.finish);

        let extent = size.extend(1);
        let mut encoder = encoder(&self.ctx, "iterative simulation");
        total.clear(&mut encoder);
        pending[0].clear(&mut encoder);
        pending[1].clear(&mut encoder);
        self.seed.dispatch(&mut encoder, &seed_groups[0], extent);
        for i in 0..self.settings.max_num_iterations as usize {
            let from = i % 2;
            self.iterate.dispatch(&mut encoder, &iterate_groups[from], extent);
            pending[from].clear(&mut encoder);
        }
        self.finish.dispatch(&mut encoder, &finish_groups[0], extent);
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        tracing::debug!(iterations = self.settings.max_num_iterations, size = %size, "flux routed");
        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for IterativeSimulationNode {
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

    #[tokio::test]
    async fn flux_only_flows_downhill() {
        let Some(ctx) = context().await else { return };
        let size = UVec2::new(32, 16);
        let heights: Vec<f32> = (0..size.y).flat_map(|_| (0..size.x).map(|x| 1000.0 - 5.0 * x as f32)).collect();
        let height_texture = TextureWithSampler::new(&ctx, "heights", size, wgpu::TextureFormat::R32Float);
        height_texture.write(&ctx, bytemuck::cast_slice(&heights));
        let mut marks = vec![0u8; (size.x * size.y * 4) as usize];
        let at = |x: u32, y: u32| ((y * size.x + x) * 4) as usize;
        marks[at(4, 8)..at(4, 8) + 4].copy_from_slice(&[255, 0, 0, 255]);
        let release = TextureWithSampler::new(&ctx, "release", size, wgpu::TextureFormat::Rgba8Unorm);
        release.write(&ctx, &marks);

        let mut node = IterativeSimulationNode::new(ctx.clone(), IterativeSimulationSettings::default());
        node.run(Inputs::new(INPUTS, vec![Data::Texture(Arc::new(height_texture)), Data::Texture(Arc::new(release))]))
            .await
            .unwrap();
        let Some(Data::Texture(out)) = node.output(0) else { panic!("no output") };
        let texels = out.read_back(&ctx).await.unwrap();
        assert!(texels[at(4, 8) + 3] > 0);
        assert!(texels[at(5, 8) + 3] > 0);
        assert!(texels[at(10, 8) + 3] > 0);
        assert_eq!(texels[at(3, 8) + 3], 0);
        assert_eq!(texels[at(4, 2) + 3], 0);
    }
}
