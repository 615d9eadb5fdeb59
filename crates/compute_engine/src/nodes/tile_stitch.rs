use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::nodes::select_tiles::tiles_bounds;
use crate::storage::decode_tile;
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use glam::UVec2;
use rayon::prelude::*;
use std::sync::Arc;
use tile_core::{Aabb2, Scheme};

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("tile data", DataType::ByteBuffers),
];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("texture", DataType::Texture),
    SocketSpec::new("region aabb", DataType::Aabb2),
];

#[derive(Debug, Clone, Copy)]
pub struct TileStitchSettings {
    pub tile_size: UVec2,
    /// Tiles repeat their neighbour's first row and column; the duplicate is dropped.
    pub tile_has_border: bool,
    pub max_texture_size: u32,
}

impl Default for TileStitchSettings {
    fn default() -> Self {
        Self { tile_size: UVec2::splat(256), tile_has_border: false, max_texture_size: 8192 }
    }
}

/// Decodes a rectangular set of tiles and lays them out, north up, in one
/// RGBA8 texture.
pub struct TileStitchNode {
    ctx: Arc<GpuContext>,
    settings: TileStitchSettings,
    texture: Option<Arc<TextureWithSampler>>,
    region: Option<Aabb2>,
}

/// Texel offset of the tile at `coords` inside the stitched image.
fn tile_origin(coords: UVec2, min: UVec2, max_y: u32, stride: UVec2) -> UVec2 {
    UVec2::new(coords.x - min.x, max_y - coords.y) * stride
}

impl TileStitchNode {
    pub fn new(ctx: Arc<GpuContext>, settings: TileStitchSettings) -> Self {
        Self { ctx, settings, texture: None, region: None }
    }

    fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let ids = inputs.tile_ids("tile ids")?;
        let data = inputs.byte_buffers("tile data")?;
        if ids.is_empty() || ids.len() != data.len() {
            return Err(ComputeError::InvalidInput(format!("cannot stitch {} ids with {} buffers", ids.len(), data.len())));
        }
        let tms: Vec<_> = ids.iter().map(|id| id.to(Scheme::Tms)).collect();
        let zoom = tms[0].zoom_level;
        if tms.iter().any(|id| id.zoom_level != zoom) {
            return Err(ComputeError::InvalidInput("tiles to stitch span several zoom levels".into()));
        }

        let min = tms.iter().fold(UVec2::MAX, |acc, id| acc.min(id.coords));
        let max = tms.iter().fold(UVec2::ZERO, |acc, id| acc.max(id.coords));
        let tile_size = self.settings.tile_size;
        let stride = match self.settings.tile_has_border {
            true => tile_size - UVec2::ONE,
            false => tile_size,
        };
        let size = (max - min + UVec2::ONE) * stride;
        let limit = self.settings.max_texture_size.min(self.ctx.limits().max_texture_dimension_2d);
        if size.max_element() > limit {
            return Err(ComputeError::CapacityExceeded {
                what: "stitched texture edge".into(),
                required: size.max_element() as usize,
                available: limit as usize,
            });
        }

        let texture = TextureWithSampler::new(&self.ctx, "stitched tiles", size, wgpu::TextureFormat::Rgba8Unorm);
        let decoded: Vec<_> = data
            .par_iter()
            .map(|bytes| (!bytes.is_empty()).then(|| decode_tile(bytes, wgpu::TextureFormat::Rgba8Unorm, tile_size)))
            .collect();

        for (id, texels) in tms.iter().zip(decoded) {
            let texels = match texels {
                Some(Ok(t)) => t,
                Some(Err(e)) => {
                    tracing::warn!(tile = %id, error = %e, "tile could not be decoded, leaving a hole");
                    continue;
                }
                None => continue,
            };
            let texels = if stride == tile_size { texels } else { crop(&texels, tile_size, stride) };
            texture.write_region(&self.ctx, tile_origin(id.coords, min, max.y, stride), stride, &texels);
        }

        tracing::debug!(tiles = ids.len(), size = %size, "tiles stitched");
        self.region = Some(tiles_bounds(&tms));
        self.texture = Some(Arc::new(texture));
        Ok(())
    }
}

/// Keeps the top-left `to` texels of an RGBA8 image of size `from`.
fn crop(texels: &[u8], from: UVec2, to: UVec2) -> Vec<u8> {
    let row = (from.x * 4) as usize;
    texels
        .chunks(row)
        .take(to.y as usize)
        .flat_map(|r| r[..(to.x * 4) as usize].iter().copied())
        .collect()
}

impl Node for TileStitchNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        match index {
            0 => self.texture.clone().map(Data::Texture),
            1 => self.region.map(Data::Aabb2),
            _ => None,
        }
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        let result = self.run_impl(inputs);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use crate::storage::tests::png;
    use bytes::Bytes;
    use tile_core::Id;

    #[test]
    fn northern_tiles_go_to_the_top() {
        let stride = UVec2::splat(256);
        let min = UVec2::new(10, 20);
        assert_eq!(tile_origin(UVec2::new(10, 21), min, 21, stride), UVec2::new(0, 0));
        assert_eq!(tile_origin(UVec2::new(11, 20), min, 21, stride), UVec2::new(256, 256));
    }

    #[test]
    fn borders_are_cropped() {
        let texels: Vec<u8> = (0..3 * 3 * 4).map(|v| v as u8).collect();
        let cropped = crop(&texels, UVec2::splat(3), UVec2::splat(2));
        assert_eq!(cropped.len(), 16);
        assert_eq!(&cropped[8..12], &texels[12..16]);
    }

    #[tokio::test]
    async fn two_tiles_stitch_vertically() {
        let Some(ctx) = context().await else { return };
        let settings = TileStitchSettings { tile_size: UVec2::splat(4), ..Default::default() };
        let mut node = TileStitchNode::new(ctx.clone(), settings);
        let north = Id::new(2, 1, 2, Scheme::Tms);
        let south = Id::new(2, 1, 1, Scheme::Tms);
        let inputs = Inputs::new(
            INPUTS,
            vec![
                Data::TileIds(Arc::new(vec![south, north])),
                Data::ByteBuffers(Arc::new(vec![Bytes::from(png(4, [0, 0, 255, 255])), Bytes::from(png(4, [255, 0, 0, 255]))])),
            ],
        );
        node.run(inputs).await.unwrap();

        let Some(Data::Texture(texture)) = node.output(0) else { panic!("no texture") };
        assert_eq!(texture.size, UVec2::new(4, 8));
        let texels = texture.read_back(&ctx).await.unwrap();
        assert_eq!(&texels[..4], &[255, 0, 0, 255]);
        assert_eq!(&texels[texels.len() - 4..], &[0, 0, 255, 255]);
    }
}
