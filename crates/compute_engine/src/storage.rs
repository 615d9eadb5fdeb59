//! Layered tile texture: one array layer per resident tile.

use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use glam::UVec2;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel};

pub struct TileStorageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
    resolution: UVec2,
    used: Vec<bool>,
}

impl TileStorageTexture {
    pub fn new(ctx: &GpuContext, label: &str, resolution: UVec2, capacity: usize, format: wgpu::TextureFormat) -> Result<Self> {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
        match format {
            wgpu::TextureFormat::Rgba8Unorm => usage |= wgpu::TextureUsages::STORAGE_BINDING,
            wgpu::TextureFormat::R16Uint => {}
            other => return Err(ComputeError::InvalidInput(format!("unsupported tile storage format {other:?}"))),
        }
        let max_layers = ctx.limits().max_texture_array_layers as usize;
        if capacity == 0 || capacity > max_layers {
            return Err(ComputeError::CapacityExceeded {
                what: format!("tile storage '{label}'"),
                required: capacity,
                available: max_layers,
            });
        }
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: resolution.x, height: resolution.y, depth_or_array_layers: capacity as u32 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Ok(Self { texture, view, sampler, format, resolution, used: vec![false; capacity] })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    pub fn n_used(&self) -> usize {
        self.used.iter().filter(|u| **u).count()
    }

    pub fn n_free(&self) -> usize {
        self.capacity() - self.n_used()
    }

    pub fn is_used(&self, layer: u32) -> bool {
        self.used.get(layer as usize).copied().unwrap_or(false)
    }

    pub fn used_layers(&self) -> impl Iterator<Item = u32> + '_ {
        self.used.iter().enumerate().filter(|(_, u)| **u).map(|(i, _)| i as u32)
    }

    /// Marks the lowest free layer as used.
    pub fn reserve(&mut self) -> Option<u32> {
        let layer = self.used.iter().position(|u| !u)?;
        self.used[layer] = true;
        Some(layer as u32)
    }

    pub fn reserve_layer(&mut self, layer: u32) -> Result<()> {
        let slot = self.used.get_mut(layer as usize).ok_or_else(|| {
            ComputeError::InvalidInput(format!("layer {layer} is outside the tile storage"))
        })?;
        *slot = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.used.iter_mut().for_each(|u| *u = false);
    }

    pub fn clear_layer(&mut self, layer: u32) {
        if let Some(slot) = self.used.get_mut(layer as usize) {
            *slot = false;
        }
    }

    /// Decodes an encoded tile and writes it into a newly reserved layer.
    pub fn store(&mut self, ctx: &GpuContext, encoded: &[u8]) -> Result<u32> {
        let texels = decode_tile(encoded, self.format, self.resolution)?;
        let layer = self.reserve().ok_or_else(|| ComputeError::CapacityExceeded {
            what: "tile storage".into(),
            required: self.capacity() + 1,
            available: self.capacity(),
        })?;
        self.write_layer(ctx, layer, &texels);
        Ok(layer)
    }

    /// Writes already decoded texels into `layer`.
    pub fn write_layer(&self, ctx: &GpuContext, layer: u32, texels: &[u8]) {
        let bytes_per_texel = self.format.block_copy_size(None).unwrap_or(4);
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.resolution.x * bytes_per_texel),
                rows_per_image: Some(self.resolution.y),
            },
            wgpu::Extent3d { width: self.resolution.x, height: self.resolution.y, depth_or_array_layers: 1 },
        );
    }
}

/// Decodes a PNG or JPEG tile into tightly packed texels of `format`.
///
/// `R16Uint` texels carry the height packed as `(r << 8) | g`. Tiles of a
/// different size are resampled with nearest filtering so encoded values
/// are never blended.
pub fn decode_tile(encoded: &[u8], format: wgpu::TextureFormat, resolution: UVec2) -> Result<Vec<u8>> {
    let rgba = image::load_from_memory(encoded)?.to_rgba8();
    match format {
        wgpu::TextureFormat::R16Uint => {
            let (width, height) = rgba.dimensions();
            let packed: Vec<u16> = rgba.pixels().map(|p| u16::from(p[0]) << 8 | u16::from(p[1])).collect();
            let raster = ImageBuffer::<Luma<u16>, _>::from_raw(width, height, packed)
                .ok_or_else(|| ComputeError::InvalidInput(format!("height raster of {width}x{height} is truncated")))?;
            Ok(bytemuck::cast_slice(resample(raster, resolution).as_raw()).to_vec())
        }
        _ => Ok(resample(rgba, resolution).into_raw()),
    }
}

fn resample<P>(image: ImageBuffer<P, Vec<P::Subpixel>>, resolution: UVec2) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if image.dimensions() == (resolution.x, resolution.y) {
        return image;
    }
    imageops::resize(&image, resolution.x, resolution.y, FilterType::Nearest)
}
