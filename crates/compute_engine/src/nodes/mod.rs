//! Compute nodes. Textures are north-up: row 0 is the northern edge of the
//! region they cover.

pub mod buffer_to_texture;
pub mod create_hash_map;
pub mod d8_directions;
pub mod downsample;
pub mod fxaa;
pub mod height_decode;
pub mod influence_area;
pub mod iterative_simulation;
pub mod load_region_aabb;
pub mod load_texture;
pub mod normals;
pub mod release_points;
pub mod request_tiles;
pub mod select_tiles;
pub mod snow;
pub mod tile_stitch;
pub mod trajectories;
pub mod upsample;

pub use buffer_to_texture::BufferToTextureNode;
pub use create_hash_map::CreateHashMapNode;
pub use d8_directions::D8DirectionsNode;
pub use downsample::DownsampleTilesNode;
pub use fxaa::FxaaNode;
pub use height_decode::HeightDecodeNode;
pub use influence_area::ComputeInfluenceAreaNode;
pub use iterative_simulation::IterativeSimulationNode;
pub use load_region_aabb::LoadRegionAabbNode;
pub use load_texture::LoadTextureNode;
pub use normals::ComputeNormalsNode;
pub use release_points::ComputeReleasePointsNode;
pub use request_tiles::RequestTilesNode;
pub use select_tiles::SelectTilesNode;
pub use snow::ComputeSnowNode;
pub use tile_stitch::TileStitchNode;
pub use trajectories::ComputeAvalancheTrajectoriesNode;
pub use upsample::UpsampleTexturesNode;

use crate::context::GpuContext;
use glam::{DVec2, UVec2, Vec2};
use tile_core::{srs, Aabb2};

/// Ground metres covered by one texel of a texture spanning `region`,
/// corrected for the Mercator scale at the region centre.
pub(crate) fn texel_size_m(region: &Aabb2, size: UVec2) -> Vec2 {
    let lat = srs::world_to_lat_long(region.centre()).x.to_radians();
    let per_texel = region.size() / size.max(UVec2::ONE).as_dvec2();
    (per_texel * lat.cos()).as_vec2()
}

pub(crate) fn encoder(ctx: &GpuContext, label: &str) -> wgpu::CommandEncoder {
    ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
}

/// World position of the centre of texel `texel` in a north-up raster over `region`.
pub(crate) fn texel_centre_world(region: &Aabb2, size: UVec2, texel: UVec2) -> DVec2 {
    let uv = (texel.as_dvec2() + DVec2::splat(0.5)) / size.as_dvec2();
    DVec2::new(region.min.x + uv.x * region.size().x, region.max.y - uv.y * region.size().y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_core::{Id, Scheme};

    #[test]
    fn texel_size_shrinks_with_latitude() {
        let equator = srs::tile_bounds(Id::new(10, 512, 512, Scheme::Tms));
        let alps = srs::tile_bounds(srs::world_xy_to_tile_id(srs::lat_long_to_world(DVec2::new(47.0, 11.0)), 10));
        let a = texel_size_m(&equator, UVec2::splat(256));
        let b = texel_size_m(&alps, UVec2::splat(256));
        assert!((a.x - b.x / (47.0f32.to_radians().cos())).abs() / a.x < 0.01);
    }

    #[test]
    fn first_texel_is_north_west() {
        let region = Aabb2::new(DVec2::new(0.0, 0.0), DVec2::new(100.0, 100.0));
        let p = texel_centre_world(&region, UVec2::splat(10), UVec2::ZERO);
        assert_eq!(p, DVec2::new(5.0, 95.0));
    }
}
