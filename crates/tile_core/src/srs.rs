//! EPSG:3857 helpers. Tile bounds follow TMS, so `y = 0` is the southern edge.

use crate::aabb::Aabb2;
use crate::tile::{Id, Scheme};
use glam::{DVec2, DVec3, UVec2};
use std::f64::consts::PI;

pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Half the side length of the level 0 tile.
pub const ORIGIN_SHIFT_M: f64 = PI * EARTH_RADIUS_M;
pub const MAX_LATITUDE_DEG: f64 = 85.051_128_779_806_6;

#[inline]
pub fn number_of_horizontal_tiles_for_zoom_level(zoom_level: u32) -> u32 {
    1u32.checked_shl(zoom_level).unwrap_or(u32::MAX)
}

#[inline]
pub fn tile_width_m(zoom_level: u32) -> f64 {
    2.0 * ORIGIN_SHIFT_M / f64::from(number_of_horizontal_tiles_for_zoom_level(zoom_level))
}

pub fn tile_bounds(id: Id) -> Aabb2 {
    let tms = id.to(Scheme::Tms);
    let w = tile_width_m(tms.zoom_level);
    let min = DVec2::new(
        -ORIGIN_SHIFT_M + f64::from(tms.coords.x) * w,
        -ORIGIN_SHIFT_M + f64::from(tms.coords.y) * w,
    );
    Aabb2::new(min, min + DVec2::splat(w))
}

/// TMS tile containing `point`; points outside the world are clamped to the edge tiles.
pub fn world_xy_to_tile_id(point: DVec2, zoom_level: u32) -> Id {
    let n = number_of_horizontal_tiles_for_zoom_level(zoom_level);
    let w = tile_width_m(zoom_level);
    let rel = (point + DVec2::splat(ORIGIN_SHIFT_M)) / w;
    let clamp = |v: f64| -> u32 { (v.floor().max(0.0) as u32).min(n - 1) };
    Id { zoom_level, coords: UVec2::new(clamp(rel.x), clamp(rel.y)), scheme: Scheme::Tms }
}

/// `lat_long` in degrees to world metres.
pub fn lat_long_to_world(lat_long: DVec2) -> DVec2 {
    let lat = lat_long.x.clamp(-MAX_LATITUDE_DEG, MAX_LATITUDE_DEG);
    let x = lat_long.y * ORIGIN_SHIFT_M / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0) * ORIGIN_SHIFT_M / 180.0;
    DVec2::new(x, y)
}

pub fn lat_long_alt_to_world(lat_long_alt: DVec3) -> DVec3 {
    lat_long_to_world(lat_long_alt.truncate()).extend(lat_long_alt.z)
}

/// World metres to `(lat, long)` in degrees.
pub fn world_to_lat_long(world: DVec2) -> DVec2 {
    let lon = world.x / ORIGIN_SHIFT_M * 180.0;
    let lat = world.y / ORIGIN_SHIFT_M * 180.0;
    let lat = 180.0 / PI * (2.0 * (lat * PI / 180.0).exp().atan() - PI / 2.0);
    DVec2::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_covers_world() {
        let b = tile_bounds(Id::root());
        assert!((b.min.x + ORIGIN_SHIFT_M).abs() < 1e-6);
        assert!((b.max.y - ORIGIN_SHIFT_M).abs() < 1e-6);
    }

    #[test]
    fn children_tile_parent() {
        let parent = Id::new(9, 271, 333, Scheme::Tms);
        let pb = tile_bounds(parent);
        let mut union = Aabb2::empty();
        for c in parent.children() {
            let cb = tile_bounds(c);
            assert!(pb.contains_box(&cb));
            union.expand_by(&cb);
        }
        assert!((union.min - pb.min).length() < 1e-6);
        assert!((union.max - pb.max).length() < 1e-6);
    }

    #[test]
    fn slippy_and_tms_bounds_agree() {
        let id = Id::new(4, 3, 2, Scheme::SlippyMap);
        assert_eq!(tile_bounds(id), tile_bounds(id.to(Scheme::Tms)));
        // northern hemisphere in slippy rows
        assert!(tile_bounds(id).min.y > 0.0);
    }

    #[test]
    fn lat_long_round_trip() {
        let ll = DVec2::new(47.0748, 12.6949);
        let back = world_to_lat_long(lat_long_to_world(ll));
        assert!((back - ll).length() < 1e-9);
    }

    #[test]
    fn world_point_to_tile() {
        let p = lat_long_to_world(DVec2::new(47.0748, 12.6949));
        let id = world_xy_to_tile_id(p, 14);
        assert!(tile_bounds(id).contains(p));
        let corner = world_xy_to_tile_id(DVec2::splat(ORIGIN_SHIFT_M), 3);
        assert_eq!(corner.coords, UVec2::new(7, 7));
    }
}
