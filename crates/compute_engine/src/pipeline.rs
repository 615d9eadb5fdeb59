use crate::context::GpuContext;
use glam::UVec3;

/// Threads per workgroup of every 2D kernel in this crate.
pub const WORKGROUP_SIZE: UVec3 = UVec3::new(16, 16, 1);

/// Shape of one bind group entry. Entries are numbered by position.
#[derive(Debug, Clone, Copy)]
pub enum Binding {
    Uniform,
    Storage { read_only: bool },
    /// `texture_2d<f32>`; unfilterable formats such as `r32float` need `filterable: false`.
    Texture { filterable: bool },
    TextureArray,
    /// `texture_2d_array<u32>`, read with `textureLoad` only.
    UintTextureArray,
    StorageTexture { format: wgpu::TextureFormat },
    StorageTextureArray { format: wgpu::TextureFormat },
    Sampler,
}

impl Binding {
    fn ty(self) -> wgpu::BindingType {
        match self {
            Binding::Uniform => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Binding::Storage { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Binding::Texture { filterable } => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            Binding::TextureArray => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2Array,
                multisampled: false,
            },
            Binding::UintTextureArray => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Uint,
                view_dimension: wgpu::TextureViewDimension::D2Array,
                multisampled: false,
            },
            Binding::StorageTexture { format } => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            Binding::StorageTextureArray { format } => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2Array,
            },
            Binding::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        }
    }
}

/// A compute pipeline with an explicit single bind group layout.
pub struct ComputePipeline {
    label: &'static str,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl ComputePipeline {
    pub fn new(ctx: &GpuContext, label: &'static str, source: &str, entry_point: &str, bindings: &[Binding]) -> Self {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .enumerate()
            .map(|(i, b)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: b.ty(),
                count: None,
            })
            .collect();
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point,
            compilation_options: Default::default(),
        });
        Self { label, pipeline, layout }
    }

    pub fn bind_group(&self, ctx: &GpuContext, resources: &[wgpu::BindingResource]) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(i, resource)| wgpu::BindGroupEntry { binding: i as u32, resource: resource.clone() })
            .collect();
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Records one dispatch covering `extent` threads.
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup, extent: UVec3) {
        let groups = workgroup_count(extent);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(groups.x, groups.y, groups.z);
    }
}

/// Workgroups needed to cover `extent` with [`WORKGROUP_SIZE`].
pub fn workgroup_count(extent: UVec3) -> UVec3 {
    UVec3::new(
        extent.x.div_ceil(WORKGROUP_SIZE.x),
        extent.y.div_ceil(WORKGROUP_SIZE.y),
        extent.z.div_ceil(WORKGROUP_SIZE.z),
    )
}
