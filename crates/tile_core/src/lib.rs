//! Tile addressing shared by the scheduler and the compute engine.
//!
//! - Tiles are cells of a global quadtree, addressed by `(zoom, x, y)`.
//! - Two row conventions exist: `SlippyMap` (y grows southwards) and `Tms`
//!   (y grows northwards). World bounds are always computed in TMS.
//! - World space is EPSG:3857 (spherical Mercator) in metres, clamped at
//!   ±85.0511° latitude; level 0 is a single tile covering the whole square.
//!
//! The crate carries no GPU or async dependencies so it can be used from
//! both the scheduler executor and the GPU executor.

pub mod aabb;
pub mod hash;
pub mod height;
pub mod srs;
pub mod tile;

pub use aabb::{Aabb2, Aabb3};
pub use hash::gpu_hash;
pub use height::{decode_height_rgb, encode_height_rgb};
pub use tile::{Id, Scheme};
