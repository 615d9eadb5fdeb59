use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::encoder;
use crate::pipeline::{Binding, ComputePipeline};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use glam::Vec2;
use std::sync::Arc;

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("raster dimensions", DataType::UVec2),
    SocketSpec::new("storage buffer", DataType::Buffer),
    SocketSpec::new("transparency buffer", DataType::Buffer),
];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", DataType::Texture)];

pub const MAX_TEXTURE_SIZE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferToTextureSettings {
    /// Values mapped to the first and last colour of the ramp.
    pub color_map_bounds: Vec2,
    /// Transparency buffer values mapped to fully transparent and fully opaque.
    pub transparency_map_bounds: Vec2,
    /// Blend between neighbouring colours instead of picking discrete bins.
    pub use_bin_interpolation: bool,
    pub use_transparency_buffer: bool,
}

impl Default for BufferToTextureSettings {
    fn default() -> Self {
        Self {
            color_map_bounds: Vec2::new(0.0, 1.0),
            transparency_map_bounds: Vec2::new(0.0, 1.0),
            use_bin_interpolation: true,
            use_transparency_buffer: false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct BufferToTextureUniform {
    dimensions: [u32; 2],
    color_map_bounds: [f32; 2],
    transparency_map_bounds: [f32; 2],
    value_kind: u32,
    transparency_kind: u32,
    use_bin_interpolation: u32,
    use_transparency_buffer: u32,
    _pad: [u32; 2],
}

const BUFFER_TO_TEXTURE_WGSL: &str = r#"
struct Params {
    dimensions: vec2<u32>,
    color_map_bounds: vec2<f32>,
    transparency_map_bounds: vec2<f32>,
    value_kind: u32,
    transparency_kind: u32,
    use_bin_interpolation: u32,
    use_transparency_buffer: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> values: array<u32>;
@group(0) @binding(2) var<storage, read> transparency: array<u32>;
@group(0) @binding(3) var output: texture_storage_2d<rgba8unorm, write>;

const RAMP_LEN: u32 = 6u;

fn ramp(i: u32) -> vec3<f32> {
    var colours = array<vec3<f32>, 6>(
        vec3<f32>(0.19, 0.21, 0.58),
        vec3<f32>(0.16, 0.50, 0.73),
        vec3<f32>(0.40, 0.76, 0.65),
        vec3<f32>(0.99, 0.86, 0.45),
        vec3<f32>(0.96, 0.43, 0.26),
        vec3<f32>(0.65, 0.00, 0.15),
    );
    return colours[min(i, RAMP_LEN - 1u)];
}

// 0 unsigned, 1 signed, 2 float bits, 3 sign-flipped fixed point
fn decode(word: u32, kind: u32) -> f32 {
    switch kind {
        case 1u: { return f32(bitcast<i32>(word)); }
        case 2u: { return bitcast<f32>(word); }
        case 3u: {
            if (word == 0u) {
                return 0.0;
            }
            return f32(bitcast<i32>(word ^ 0x80000000u)) / 1000.0;
        }
        default: { return f32(word); }
    }
}

fn normalized(v: f32, bounds: vec2<f32>) -> f32 {
    return clamp((v - bounds.x) / max(bounds.y - bounds.x, 1e-6), 0.0, 1.0);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.dimensions.x || id.y >= params.dimensions.y) {
        return;
    }
    let i = id.y * params.dimensions.x + id.x;
    let word = values[i];
    if (word == 0u) {
        textureStore(output, vec2<i32>(id.xy), vec4<f32>(0.0));
        return;
    }

    let t = normalized(decode(word, params.value_kind), params.color_map_bounds);
    var colour: vec3<f32>;
    if (params.use_bin_interpolation != 0u) {
        let x = t * f32(RAMP_LEN - 1u);
        let lo = u32(floor(x));
        colour = mix(ramp(lo), ramp(lo + 1u), fract(x));
    } else {
        colour = ramp(u32(t * f32(RAMP_LEN)));
    }

    var alpha = 1.0;
    if (params.use_transparency_buffer != 0u) {
        alpha = normalized(decode(transparency[i], params.transparency_kind), params.transparency_map_bounds);
    }
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(colour, alpha));
}
"#;

/// Colour maps a raster buffer into an RGBA8 texture. Texels whose word was
/// never written stay transparent.
pub struct BufferToTextureNode {
    ctx: Arc<GpuContext>,
    pipeline: ComputePipeline,
    uniform: Buffer<BufferToTextureUniform>,
    settings: BufferToTextureSettings,
    output: Option<Arc<TextureWithSampler>>,
}

impl BufferToTextureNode {
    pub fn new(ctx: Arc<GpuContext>, settings: BufferToTextureSettings) -> Self {
        let pipeline = ComputePipeline::new(
            &ctx,
            "buffer to texture",
            BUFFER_TO_TEXTURE_WGSL,
            "main",
            &[
                Binding::Uniform,
                Binding::Storage { read_only: true },
                Binding::Storage { read_only: true },
                Binding::StorageTexture { format: wgpu::TextureFormat::Rgba8Unorm },
            ],
        );
        let uniform = Buffer::new(&ctx, "buffer to texture params", BufferToTextureUniform::default());
        Self { ctx, pipeline, uniform, settings, output: None }
    }

    pub fn set_settings(&mut self, settings: BufferToTextureSettings) {
        self.settings = settings;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let dimensions = inputs.uvec2("raster dimensions")?;
        let values = inputs.buffer("storage buffer")?;
        let transparency = inputs.buffer("transparency buffer")?;

        if dimensions.max_element() > MAX_TEXTURE_SIZE {
            return Err(ComputeError::CapacityExceeded {
                what: "colour mapped texture edge".into(),
                required: dimensions.max_element() as usize,
                available: MAX_TEXTURE_SIZE as usize,
            });
        }
        let texels = (dimensions.x * dimensions.y) as usize;
        if values.len() < texels {
            return Err(ComputeError::InvalidInput(format!(
                "buffer holds {} values, raster {dimensions} needs {texels}",
                values.len()
            )));
        }
        let use_transparency = self.settings.use_transparency_buffer && transparency.len() >= texels;
        if self.settings.use_transparency_buffer && !use_transparency {
            tracing::debug!(len = transparency.len(), "transparency buffer too short, output is opaque");
        }

        self.uniform.data = BufferToTextureUniform {
            dimensions: dimensions.to_array(),
            color_map_bounds: self.settings.color_map_bounds.to_array(),
            transparency_map_bounds: self.settings.transparency_map_bounds.to_array(),
            value_kind: values.kind().shader_tag(),
            transparency_kind: transparency.kind().shader_tag(),
            use_bin_interpolation: u32::from(self.settings.use_bin_interpolation),
            use_transparency_buffer: u32::from(use_transparency),
            _pad: [0; 2],
        };
        self.uniform.update_gpu_data(&self.ctx.queue);

        let output = TextureWithSampler::new(&self.ctx, "colour mapped buffer", dimensions, wgpu::TextureFormat::Rgba8Unorm);
        let bind_group = self.pipeline.bind_group(
            &self.ctx,
            &[
                self.uniform.binding(),
                values.binding(),
                transparency.binding(),
                wgpu::BindingResource::TextureView(&output.view),
            ],
        );
        let mut encoder = encoder(&self.ctx, "buffer to texture");
        self.pipeline.dispatch(&mut encoder, &bind_group, dimensions.extend(1));
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.submitted_work_done().await?;

        self.output = Some(Arc::new(output));
        Ok(())
    }
}

impl Node for BufferToTextureNode {
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
