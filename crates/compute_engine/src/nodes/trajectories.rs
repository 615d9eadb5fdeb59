//! Monte-Carlo avalanche paths over a height field.
//!
//! One invocation traces one path: `x`/`y` select the release texel and `z`
//! the path index. All layers are written with atomics on fixed-point words
//! (see [`crate::kernel::encode_fixed`]) so that any number of paths can hit
//! the same output texel.

use crate::buffer::{Buffer, ElementKind, RawBuffer};
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::kernel::{self, TrajectoryInputs, TrajectoryLayers, TrajectorySettings};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::normals::decode_normal;
use crate::nodes::{encoder, texel_size_m};
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::{ensure_same_size, TextureWithSampler};
use futures::future::BoxFuture;
use glam::{UVec2, UVec3};
use std::sync::Arc;
use std::time::Instant;
use tile_core::Aabb2;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("region aabb", DataType::Aabb2),
    SocketSpec::new("normal texture", DataType::Texture),
    SocketSpec::new("height texture", DataType::Texture),
    SocketSpec::new("release point texture", DataType::Texture),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("storage buffer", DataType::Buffer),
    SocketSpec::new("raster dimensions", DataType::UVec2),
    SocketSpec::new("z delta", DataType::Buffer),
    SocketSpec::new("cell counts", DataType::Buffer),
    SocketSpec::new("travel length", DataType::Buffer),
    SocketSpec::new("travel angle", DataType::Buffer),
    SocketSpec::new("altitude difference", DataType::Buffer),
];

/// Where the paths are traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Gpu,
    /// Reads the inputs back and runs [`kernel::simulate`]; results are uploaded
    /// into the same output buffers.
    Cpu,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct TrajectoryUniform {
    output_resolution: [u32; 2],
    input_resolution: [u32; 2],
    cell_size_m: f32,
    num_steps: u32,
    step_length: f32,
    random_contribution: f32,
    persistence_contribution: f32,
    physics_model: u32,
    runout_model: u32,
    random_seed: u32,
    num_paths: u32,
    resolution_multiplier: u32,
    slowdown_coefficient: f32,
    speedup_coefficient: f32,
    gravity: f32,
    mass: f32,
    friction_coeff: f32,
    drag_coeff: f32,
    d8_center_height_offset: f32,
    perla_my: f32,
    perla_md: f32,
    perla_g: f32,
    flowpy_alpha: f32,
    output_layers: u32,
    _pad: [u32; 2],
    d8_weights: [f32; 8],
}

impl TrajectoryUniform {
    fn new(s: &TrajectorySettings, input: UVec2, output: UVec2, cell_size_m: f32) -> Self {
        Self {
            output_resolution: output.to_array(),
            input_resolution: input.to_array(),
            cell_size_m,
            num_steps: s.num_steps,
            step_length: s.step_length,
            random_contribution: s.random_contribution,
            persistence_contribution: s.persistence_contribution,
            physics_model: s.physics_model.shader_tag(),
            runout_model: s.runout_model.shader_tag(),
            random_seed: s.random_seed,
            num_paths: s.num_paths_per_release_cell,
            resolution_multiplier: s.resolution_multiplier.max(1),
            slowdown_coefficient: s.simple.slowdown_coefficient,
            speedup_coefficient: s.simple.speedup_coefficient,
            gravity: s.less_simple.gravity,
            mass: s.less_simple.mass,
            friction_coeff: s.less_simple.friction_coeff,
            drag_coeff: s.less_simple.drag_coeff,
            d8_center_height_offset: s.d8.center_height_offset,
            perla_my: s.perla.my,
            perla_md: s.perla.md,
            perla_g: s.perla.g,
            flowpy_alpha: s.flowpy.alpha_deg.to_radians(),
            output_layers: s.output_layers.bits(),
            _pad: [0; 2],
            d8_weights: s.d8.weights,
        }
    }
}

const TRAJECTORIES_WGSL: &str = r#"
struct Params {
    output_resolution: vec2<u32>,
    input_resolution: vec2<u32>,
    cell_size_m: f32,
    num_steps: u32,
    step_length: f32,
    random_contribution: f32,
    persistence_contribution: f32,
    physics_model: u32,
    runout_model: u32,
    random_seed: u32,
    num_paths: u32,
    resolution_multiplier: u32,
    slowdown_coefficient: f32,
    speedup_coefficient: f32,
    gravity: f32,
    mass: f32,
    friction_coeff: f32,
    drag_coeff: f32,
    d8_center_height_offset: f32,
    perla_my: f32,
    perla_md: f32,
    perla_g: f32,
    flowpy_alpha: f32,
    output_layers: u32,
    _pad0: u32,
    _pad1: u32,
    d8_weights: array<vec4<f32>, 2>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var normals: texture_2d<f32>;
@group(0) @binding(2) var heights: texture_2d<f32>;
@group(0) @binding(3) var release: texture_2d<f32>;
@group(0) @binding(4) var<storage, read_write> combined: array<atomic<u32>>;
@group(0) @binding(5) var<storage, read_write> z_delta: array<atomic<u32>>;
@group(0) @binding(6) var<storage, read_write> cell_counts: array<atomic<u32>>;
@group(0) @binding(7) var<storage, read_write> travel_length: array<atomic<u32>>;
@group(0) @binding(8) var<storage, read_write> travel_angle: array<atomic<u32>>;
@group(0) @binding(9) var<storage, read_write> altitude_difference: array<atomic<u32>>;

const TAU: f32 = 6.2831853;
const SQRT_2: f32 = 1.4142135;

const MODEL_SIMPLE: u32 = 0u;
const MODEL_LESS_SIMPLE: u32 = 1u;
const MODEL_DISCRETIZED_GRADIENT: u32 = 3u;
const MODEL_D8_NO_WEIGHTS: u32 = 4u;
const MODEL_D8_WEIGHTS: u32 = 5u;
const RUNOUT_PERLA: u32 = 1u;
const RUNOUT_FLOWPY: u32 = 2u;

const LAYER_Z_DELTA: u32 = 1u;
const LAYER_CELL_COUNTS: u32 = 2u;
const LAYER_TRAVEL_LENGTH: u32 = 4u;
const LAYER_TRAVEL_ANGLE: u32 = 8u;
const LAYER_ALTITUDE_DIFFERENCE: u32 = 16u;

fn pcg(v: u32) -> u32 {
    let state = v * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn rand(state: ptr<function, u32>) -> f32 {
    *state = pcg(*state);
    return f32(*state) / 4294967295.0;
}

fn encode_fixed(v: f32) -> u32 {
    return bitcast<u32>(i32(round(clamp(v, -2.0e6, 2.0e6) * 1000.0))) ^ 0x80000000u;
}

fn load_height(t: vec2<u32>) -> f32 {
    return textureLoad(heights, vec2<i32>(t), 0).r;
}

fn load_normal(t: vec2<u32>) -> vec3<f32> {
    return textureLoad(normals, vec2<i32>(t), 0).xyz * 2.0 - 1.0;
}

struct Taps {
    t00: vec2<u32>,
    t10: vec2<u32>,
    t01: vec2<u32>,
    t11: vec2<u32>,
    f: vec2<f32>,
}

fn taps(p: vec2<f32>) -> Taps {
    let last = params.input_resolution - vec2<u32>(1u);
    let q = clamp(p - vec2<f32>(0.5), vec2<f32>(0.0), vec2<f32>(last));
    let base = floor(q);
    let b = vec2<u32>(base);
    let hi = min(b + vec2<u32>(1u), last);
    return Taps(b, vec2<u32>(hi.x, b.y), vec2<u32>(b.x, hi.y), hi, q - base);
}

fn height_at(p: vec2<f32>) -> f32 {
    let t = taps(p);
    return load_height(t.t00) * (1.0 - t.f.x) * (1.0 - t.f.y)
        + load_height(t.t10) * t.f.x * (1.0 - t.f.y)
        + load_height(t.t01) * (1.0 - t.f.x) * t.f.y
        + load_height(t.t11) * t.f.x * t.f.y;
}

fn normal_at(p: vec2<f32>) -> vec3<f32> {
    let t = taps(p);
    return load_normal(t.t00) * (1.0 - t.f.x) * (1.0 - t.f.y)
        + load_normal(t.t10) * t.f.x * (1.0 - t.f.y)
        + load_normal(t.t01) * (1.0 - t.f.x) * t.f.y
        + load_normal(t.t11) * t.f.x * t.f.y;
}

fn in_bounds(p: vec2<f32>) -> bool {
    return all(p >= vec2<f32>(0.0)) && all(p < vec2<f32>(params.input_resolution));
}

fn normalize_or(v: vec2<f32>, fallback: vec2<f32>) -> vec2<f32> {
    let l = length(v);
    if (l > 0.0) {
        return v / l;
    }
    return fallback;
}

fn snap_to_octant(d: vec2<f32>) -> vec2<f32> {
    let octant = TAU / 8.0;
    let a = round(atan2(d.y, d.x) / octant) * octant;
    return vec2<f32>(cos(a), sin(a));
}

fn layer_enabled(bit: u32) -> bool {
    return (params.output_layers & bit) != 0u;
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = params.input_resolution;
    if (id.x >= size.x || id.y >= size.y || id.z >= params.num_paths) {
        return;
    }
    if (textureLoad(release, vec2<i32>(id.xy), 0).r < 0.5) {
        return;
    }

    var rng = pcg(pcg(params.random_seed) ^ id.z ^ pcg(id.y * size.x + id.x));
    let multiplier = f32(max(params.resolution_multiplier, 1u));
    let g = params.gravity;
    let is_d8 = params.physics_model == MODEL_D8_NO_WEIGHTS || params.physics_model == MODEL_D8_WEIGHTS;
    var offsets = array<vec2<i32>, 8>(
        vec2<i32>(0, -1), vec2<i32>(1, -1), vec2<i32>(1, 0), vec2<i32>(1, 1),
        vec2<i32>(0, 1), vec2<i32>(-1, 1), vec2<i32>(-1, 0), vec2<i32>(-1, -1),
    );

    var p = vec2<f32>(id.xy) + vec2<f32>(0.5);
    let start_height = height_at(p);
    var prev_height = start_height;
    var prev_dir = vec2<f32>(0.0);
    var speed = 0.0;
    var speed_sq = 0.0;
    var perla_sq = 0.0;
    var length_m = 0.0;
    var last_pixel = 0xffffffffu;

    for (var i = 0u; i < params.num_steps; i++) {
        var next: vec2<f32>;
        var dir: vec2<f32>;
        if (is_d8) {
            let c = vec2<i32>(floor(p));
            var centre_offset = 0.0;
            if (params.physics_model == MODEL_D8_WEIGHTS) {
                centre_offset = params.d8_center_height_offset;
            }
            let centre = load_height(vec2<u32>(c)) + centre_offset;
            var best_score = 0.0;
            var best = vec2<i32>(0);
            var found = false;
            for (var k = 0u; k < 8u; k++) {
                let n = c + offsets[k];
                if (any(n < vec2<i32>(0)) || any(n >= vec2<i32>(size))) {
                    continue;
                }
                var weight = 1.0;
                if (params.physics_model == MODEL_D8_WEIGHTS) {
                    weight = params.d8_weights[k / 4u][k % 4u];
                }
                var dist = 1.0;
                if (offsets[k].x != 0 && offsets[k].y != 0) {
                    dist = SQRT_2;
                }
                let score = (centre - load_height(vec2<u32>(n))) / dist * weight;
                if (score > 0.0 && (!found || score > best_score)) {
                    best_score = score;
                    best = n;
                    found = true;
                }
            }
            if (!found) {
                break;
            }
            next = vec2<f32>(best) + vec2<f32>(0.5);
            dir = normalize_or(next - p, vec2<f32>(0.0));
        } else {
            let n = normal_at(p);
            let downhill = vec2<f32>(n.x, -n.y);
            if (length(downhill) < 1e-6) {
                break;
            }
            let d = normalize(downhill);
            let a = rand(&rng) * TAU;
            dir = normalize_or(mix(d, vec2<f32>(cos(a), sin(a)), params.random_contribution), d);
            if (any(prev_dir != vec2<f32>(0.0))) {
                dir = normalize_or(mix(dir, prev_dir, params.persistence_contribution), dir);
            }
            if (params.physics_model == MODEL_DISCRETIZED_GRADIENT) {
                dir = snap_to_octant(dir);
            }
            next = p + dir * params.step_length;
        }

        if (!in_bounds(next)) {
            break;
        }
        let height = height_at(next);
        let height_drop = prev_height - height;
        let ground = length(next - p) * params.cell_size_m;
        let slope_distance = sqrt(ground * ground + height_drop * height_drop);
        var sin_t = 0.0;
        var cos_t = 1.0;
        if (slope_distance > 0.0) {
            sin_t = height_drop / slope_distance;
            cos_t = ground / slope_distance;
        }
        let altitude = start_height - height;

        if (params.physics_model == MODEL_SIMPLE) {
            speed = speed * (1.0 - params.slowdown_coefficient) + height_drop * params.speedup_coefficient;
            if (speed <= 0.0) {
                break;
            }
            speed_sq = speed * speed;
        } else if (params.physics_model == MODEL_LESS_SIMPLE) {
            let accel = g * (sin_t - params.friction_coeff * cos_t) - speed_sq * params.mass / params.drag_coeff;
            speed_sq += 2.0 * accel * slope_distance;
            if (speed_sq <= 0.0) {
                break;
            }
            speed = sqrt(speed_sq);
        } else {
            speed_sq = max(2.0 * g * altitude, 0.0);
            speed = sqrt(speed_sq);
        }

        length_m += ground;
        if (params.runout_model == RUNOUT_PERLA) {
            let beta = exp(-2.0 * slope_distance / params.perla_md);
            perla_sq = params.perla_g * (sin_t - params.perla_my * cos_t) * params.perla_md * (1.0 - beta) + perla_sq * beta;
            if (perla_sq <= 0.0) {
                break;
            }
        } else if (params.runout_model == RUNOUT_FLOWPY) {
            if (length_m > 0.0 && atan2(altitude, length_m) < params.flowpy_alpha) {
                break;
            }
        }

        let px = min(vec2<u32>(floor(next * multiplier)), params.output_resolution - vec2<u32>(1u));
        let o = px.y * params.output_resolution.x + px.x;
        if (o != last_pixel) {
            if (layer_enabled(LAYER_CELL_COUNTS)) {
                atomicAdd(&cell_counts[o], 1u);
            }
            last_pixel = o;
        }
        atomicMax(&combined[o], encode_fixed(speed));
        if (layer_enabled(LAYER_Z_DELTA)) {
            atomicMax(&z_delta[o], encode_fixed(speed_sq / (2.0 * g)));
        }
        if (layer_enabled(LAYER_TRAVEL_LENGTH)) {
            atomicMax(&travel_length[o], encode_fixed(length_m));
        }
        if (layer_enabled(LAYER_TRAVEL_ANGLE)) {
            atomicMax(&travel_angle[o], encode_fixed(degrees(atan2(altitude, length_m))));
        }
        if (layer_enabled(LAYER_ALTITUDE_DIFFERENCE)) {
            atomicMax(&altitude_difference[o], encode_fixed(altitude));
        }

        p = next;
        prev_dir = dir;
        prev_height = height;
    }
}
"#;

/// Output buffers of one run, in output socket order after the dimensions.
struct LayerBuffers {
    size: UVec2,
    combined: Arc<RawBuffer<u32>>,
    z_delta: Arc<RawBuffer<u32>>,
    cell_counts: Arc<RawBuffer<u32>>,
    travel_length: Arc<RawBuffer<u32>>,
    travel_angle: Arc<RawBuffer<u32>>,
    altitude_difference: Arc<RawBuffer<u32>>,
}

impl LayerBuffers {
    fn new(ctx: &GpuContext, size: UVec2, s: &TrajectorySettings) -> Self {
        let n = (size.x * size.y) as usize;
        let layers = s.output_layers;
        let alloc = |label: &str, on: bool, kind: ElementKind| {
            Arc::new(RawBuffer::<u32>::storage(ctx, label, if on { n } else { 1 }).with_kind(kind))
        };
        Self {
            size,
            combined: alloc("trajectories combined", true, ElementKind::FixedPoint),
            z_delta: alloc("trajectories z delta", layers.z_delta, ElementKind::FixedPoint),
            cell_counts: alloc("trajectories cell counts", layers.cell_counts, ElementKind::U32),
            travel_length: alloc("trajectories travel length", layers.travel_length, ElementKind::FixedPoint),
            travel_angle: alloc("trajectories travel angle", layers.travel_angle, ElementKind::FixedPoint),
            altitude_difference: alloc("trajectories altitude difference", layers.altitude_difference, ElementKind::FixedPoint),
        }
    }

    fn all(&self) -> [&Arc<RawBuffer<u32>>; 6] {
        [
            &self.combined,
            &self.z_delta,
            &self.cell_counts,
            &self.travel_length,
            &self.travel_angle,
            &self.altitude_difference,
        ]
    }

    fn upload(&self, queue: &wgpu::Queue, layers: &TrajectoryLayers) {
        let sources = [
            &layers.combined,
            &layers.z_delta,
            &layers.cell_counts,
            &layers.travel_length,
            &layers.travel_angle,
            &layers.altitude_difference,
        ];
        for (buffer, words) in self.all().into_iter().zip(sources) {
            if !words.is_empty() {
                buffer.write(queue, words);
            }
        }
    }
}

/// Avalanche trajectories from release points, on the GPU or on the CPU.
pub struct ComputeAvalancheTrajectoriesNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<TrajectoryUniform>,
    settings: TrajectorySettings,
    backend: Backend,
    output: Option<LayerBuffers>,
}

impl ComputeAvalancheTrajectoriesNode {
    pub fn new(ctx: Arc<GpuContext>, settings: TrajectorySettings) -> Self {
        let storage = Binding::Storage { read_only: false };
        let pipeline = ComputePipeline::new(
            &ctx,
            "avalanche trajectories",
            TRAJECTORIES_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Texture { filterable: true },
                Binding::Texture { filterable: false },
                Binding::Texture { filterable: true },
                storage,
                storage,
                storage,
                storage,
                storage,
                storage,
            ],
        );
        let uniform = Buffer::new(&ctx, "trajectories params", TrajectoryUniform::default());
        Self { ctx, pipeline, uniform, settings, backend: Backend::Gpu, output: None }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn settings(&self) -> &TrajectorySettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TrajectorySettings) {
        self.settings = settings;
    }

    fn check_capacity(&self, size: UVec2) -> Result<()> {
        let required = u64::from(size.x) * u64::from(size.y) * 4;
        let available = u64::from(self.ctx.limits().max_storage_buffer_binding_size);
        if required > available {
            return Err(ComputeError::CapacityExceeded {
                what: "trajectory output buffer bytes".into(),
                required: required as usize,
                available: available as usize,
            });
        }
        let paths = self.settings.num_paths_per_release_cell;
        let max_groups = self.ctx.limits().max_compute_workgroups_per_dimension;
        if paths > max_groups {
            return Err(ComputeError::CapacityExceeded {
                what: "paths per release cell".into(),
                required: paths as usize,
                available: max_groups as usize,
            });
        }
        Ok(())
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let region = inputs.aabb2("region aabb")?;
        let normals = inputs.texture("normal texture")?;
        let heights = inputs.texture("height texture")?;
        let release = inputs.texture("release point texture")?;
        ensure_same_size("trajectories normals/heights", &normals, &heights)?;
        ensure_same_size("trajectories normals/release points", &normals, &release)?;

        let input_size = heights.size;
        let output_size = input_size * self.settings.resolution_multiplier.max(1);
        self.check_capacity(output_size)?;
        let cell_size_m = texel_size_m(&region, input_size).element_sum() * 0.5;
        let buffers = LayerBuffers::new(&self.ctx, output_size, &self.settings);

        let started = Instant::now();
        match self.backend {
            Backend::Gpu => self.trace_on_gpu(&buffers, &normals, &heights, &release, cell_size_m).await?,
            Backend::Cpu => self.trace_on_cpu(&buffers, &region, &normals, &heights, &release).await?,
        }
        tracing::debug!(
            backend = ?self.backend,
            model = ?self.settings.physics_model,
            runout = ?self.settings.runout_model,
            size = %output_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "trajectories traced"
        );
        self.output = Some(buffers);
        Ok(())
    }

    async fn trace_on_gpu(
        &mut self,
        buffers: &LayerBuffers,
        normals: &TextureWithSampler,
        heights: &TextureWithSampler,
        release: &TextureWithSampler,
        cell_size_m: f32,
    ) -> Result<()> {
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                wgpu::BindingResource::TextureView(&normals.view),
                wgpu::BindingResource::TextureView(&heights.view),
                wgpu::BindingResource::TextureView(&release.view),
                buffers.combined.binding(),
                buffers.z_delta.binding(),
                buffers.cell_counts.binding(),
                buffers.travel_length.binding(),
                buffers.travel_angle.binding(),
                buffers.altitude_difference.binding(),
            ],
        );

        let mut clear = encoder(&self.ctx, "trajectories clear");
        for buffer in buffers.all() {
            buffer.clear(&mut clear);
        }
        self.ctx.queue.submit(Some(clear.finish()));

        let extent = UVec3::new(heights.size.x, heights.size.y, self.settings.num_paths_per_release_cell);
        for run in 0..self.settings.num_runs.max(1) {
            // each write lands before the submit that follows it
            let mut settings = self.settings.clone();
            settings.random_seed = self.settings.random_seed.wrapping_add(run);
            self.uniform.data = TrajectoryUniform::new(&settings, heights.size, buffers.size, cell_size_m);
            self.uniform.update_gpu_data(&self.ctx.queue);

            let mut encoder = encoder(&self.ctx, "avalanche trajectories");
            self.pipeline.dispatch(&mut encoder, &bind_group, extent);
            self.ctx.queue.submit(Some(encoder.finish()));
        }
        self.ctx.submitted_work_done().await
    }

    async fn trace_on_cpu(
        &self,
        buffers: &LayerBuffers,
        region: &Aabb2,
        normals: &TextureWithSampler,
        heights: &TextureWithSampler,
        release: &TextureWithSampler,
    ) -> Result<()> {
        let size = heights.size;
        let heights = heights.read_back_f32(&self.ctx).await?;
        let normals: Vec<_> = normals
            .read_back(&self.ctx)
            .await?
            .chunks_exact(4)
            .map(|t| decode_normal([t[0], t[1], t[2], t[3]]))
            .collect();
        let release: Vec<bool> = release.read_back(&self.ctx).await?.chunks_exact(4).map(|t| t[0] >= 128).collect();
        let cell_size_m = texel_size_m(region, size).element_sum() * 0.5;

        let settings = self.settings.clone();
        let layers = tokio::task::spawn_blocking(move || {
            let inputs = TrajectoryInputs { size, heights: &heights, normals: &normals, release: &release, cell_size_m };
            kernel::simulate(&inputs, &settings)
        })
        .await?;
        buffers.upload(&self.ctx.queue, &layers);
        self.ctx.queue.submit(std::iter::empty());
        self.ctx.submitted_work_done().await
    }
}

impl Node for ComputeAvalancheTrajectoriesNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        let out = self.output.as_ref()?;
        let buffer = match index {
            0 => &out.combined,
            1 => return Some(Data::UVec2(out.size)),
            2 => &out.z_delta,
            3 => &out.cell_counts,
            4 => &out.travel_length,
            5 => &out.travel_angle,
            6 => &out.altitude_difference,
            _ => return None,
        };
        Some(Data::Buffer(buffer.clone()))
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}
