use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use futures::channel::oneshot;
use glam::UVec2;

/// Usage of every 2D texture produced by a node.
pub const NODE_TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

pub struct TextureWithSampler {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub format: wgpu::TextureFormat,
    pub size: UVec2,
}

impl TextureWithSampler {
    pub fn new(ctx: &GpuContext, label: &str, size: UVec2, format: wgpu::TextureFormat) -> Self {
        Self::with_usage(ctx, label, size, format, NODE_TEXTURE_USAGE)
    }

    pub fn with_usage(
        ctx: &GpuContext,
        label: &str,
        size: UVec2,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: size.x.max(1), height: size.y.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let filter = match format.sample_type(None, None) {
            Some(wgpu::TextureSampleType::Float { filterable: true }) => wgpu::FilterMode::Linear,
            _ => wgpu::FilterMode::Nearest,
        };
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self { texture, view, sampler, format, size }
    }

    pub fn bytes_per_texel(&self) -> u32 {
        self.format.block_copy_size(None).unwrap_or(4)
    }

    /// Uploads tightly packed texel data covering the whole texture.
    pub fn write(&self, ctx: &GpuContext, data: &[u8]) {
        self.write_region(ctx, UVec2::ZERO, self.size, data);
    }

    pub fn write_region(&self, ctx: &GpuContext, origin: UVec2, size: UVec2, data: &[u8]) {
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: origin.x, y: origin.y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.x * self.bytes_per_texel()),
                rows_per_image: Some(size.y),
            },
            wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: 1 },
        );
    }

    /// Reads the texture back as tightly packed rows.
    pub async fn read_back(&self, ctx: &GpuContext) -> Result<Vec<u8>> {
        let texel = self.bytes_per_texel();
        let unpadded = self.size.x * texel;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture read back"),
            size: u64::from(padded) * u64::from(self.size.y),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("texture read back") });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.size.y),
                },
            },
            wgpu::Extent3d { width: self.size.x, height: self.size.y, depth_or_array_layers: 1 },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.poll_until(rx).await??;

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((unpadded * self.size.y) as usize);
        for row in mapped.chunks(padded as usize) {
            out.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(out)
    }

    /// Reads an `r32float` texture back as floats.
    pub async fn read_back_f32(&self, ctx: &GpuContext) -> Result<Vec<f32>> {
        if self.format != wgpu::TextureFormat::R32Float {
            return Err(ComputeError::InvalidInput(format!("expected r32float, texture is {:?}", self.format)));
        }
        let bytes = self.read_back(ctx).await?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

/// Fails unless both textures have the same size.
pub fn ensure_same_size(what: &str, a: &TextureWithSampler, b: &TextureWithSampler) -> Result<()> {
    if a.size != b.size {
        return Err(ComputeError::InvalidInput(format!(
            "{what}: texture sizes differ ({} vs {})",
            a.size, b.size
        )));
    }
    Ok(())
}
