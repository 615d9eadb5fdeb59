//! Avalanche trajectory model and its CPU reference implementation.
//!
//! The WGSL kernel in `nodes::trajectories` runs the same per-step model; this
//! version is used by the CPU backend of the trajectories node and by tests.
//!
//! Paths move in texel space (x east, y south, texel centres at `+0.5`).
//! Distances and altitudes are metres.

use glam::{UVec2, Vec2, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

const FIXED_POINT_SCALE: f32 = 1000.0;
const FIXED_POINT_LIMIT: f32 = 2.0e6;
const SIGN_FLIP: u32 = 0x8000_0000;

/// Packs `value` so that unsigned comparison matches float comparison.
/// Raw `0` is reserved for "never written".
pub fn encode_fixed(value: f32) -> u32 {
    let v = (value.clamp(-FIXED_POINT_LIMIT, FIXED_POINT_LIMIT) * FIXED_POINT_SCALE).round() as i32;
    (v as u32) ^ SIGN_FLIP
}

pub fn decode_fixed(raw: u32) -> f32 {
    if raw == 0 {
        return 0.0;
    }
    ((raw ^ SIGN_FLIP) as i32) as f32 / FIXED_POINT_SCALE
}

/// PCG hash, identical to the shader's `pcg`.
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsModel {
    #[default]
    Simple,
    LessSimple,
    Gradient,
    DiscretizedGradient,
    D8NoWeights,
    D8Weights,
}

impl PhysicsModel {
    pub fn shader_tag(self) -> u32 {
        self as u32
    }

    fn is_d8(self) -> bool {
        matches!(self, PhysicsModel::D8NoWeights | PhysicsModel::D8Weights)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunoutModel {
    #[default]
    None,
    Perla,
    #[serde(alias = "flow_py")]
    Flowpy,
}

impl RunoutModel {
    pub fn shader_tag(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleModel {
    pub slowdown_coefficient: f32,
    pub speedup_coefficient: f32,
}

impl Default for SimpleModel {
    fn default() -> Self {
        Self { slowdown_coefficient: 0.0033, speedup_coefficient: 0.12 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessSimpleModel {
    pub gravity: f32,
    pub mass: f32,
    pub friction_coeff: f32,
    pub drag_coeff: f32,
}

impl Default for LessSimpleModel {
    fn default() -> Self {
        Self { gravity: 9.81, mass: 10.0, friction_coeff: 0.155, drag_coeff: 4000.0 }
    }
}

/// Neighbour weights in the order N, NE, E, SE, S, SW, W, NW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct D8Model {
    pub weights: [f32; 8],
    /// Added to the centre height, lets paths cross small flats.
    pub center_height_offset: f32,
}

impl Default for D8Model {
    fn default() -> Self {
        Self { weights: [1.0; 8], center_height_offset: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlaRunout {
    /// Sliding friction coefficient.
    pub my: f32,
    /// Mass to drag ratio in metres.
    pub md: f32,
    pub g: f32,
}

impl Default for PerlaRunout {
    fn default() -> Self {
        Self { my: 0.11, md: 40.0, g: 9.81 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowpyRunout {
    pub alpha_deg: f32,
}

impl Default for FlowpyRunout {
    fn default() -> Self {
        Self { alpha_deg: 25.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLayers {
    pub z_delta: bool,
    pub cell_counts: bool,
    pub travel_length: bool,
    pub travel_angle: bool,
    pub altitude_difference: bool,
}

impl Default for OutputLayers {
    fn default() -> Self {
        Self { z_delta: true, cell_counts: true, travel_length: true, travel_angle: true, altitude_difference: true }
    }
}

impl OutputLayers {
    pub fn bits(&self) -> u32 {
        [self.z_delta, self.cell_counts, self.travel_length, self.travel_angle, self.altitude_difference]
            .iter()
            .enumerate()
            .fold(0, |acc, (i, on)| acc | (u32::from(*on) << i))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectorySettings {
    pub num_steps: u32,
    /// In texels.
    pub step_length: f32,
    pub num_paths_per_release_cell: u32,
    pub num_runs: u32,
    pub random_contribution: f32,
    pub persistence_contribution: f32,
    pub random_seed: u32,
    pub resolution_multiplier: u32,
    pub physics_model: PhysicsModel,
    pub runout_model: RunoutModel,
    pub simple: SimpleModel,
    pub less_simple: LessSimpleModel,
    pub d8: D8Model,
    pub perla: PerlaRunout,
    pub flowpy: FlowpyRunout,
    pub output_layers: OutputLayers,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            num_steps: 2048,
            step_length: 0.1,
            num_paths_per_release_cell: 500,
            num_runs: 1,
            random_contribution: 0.2,
            persistence_contribution: 0.2,
            random_seed: 1,
            resolution_multiplier: 1,
            physics_model: PhysicsModel::default(),
            runout_model: RunoutModel::default(),
            simple: SimpleModel::default(),
            less_simple: LessSimpleModel::default(),
            d8: D8Model::default(),
            perla: PerlaRunout::default(),
            flowpy: FlowpyRunout::default(),
            output_layers: OutputLayers::default(),
        }
    }
}

/// Row-major rasters of one region, row 0 north.
pub struct TrajectoryInputs<'a> {
    pub size: UVec2,
    pub heights: &'a [f32],
    /// World-frame unit normals (east, north, up).
    pub normals: &'a [Vec3],
    pub release: &'a [bool],
    /// Ground metres per texel.
    pub cell_size_m: f32,
}

/// Raw output words; disabled layers are empty.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryLayers {
    pub size: UVec2,
    pub combined: Vec<u32>,
    pub z_delta: Vec<u32>,
    pub cell_counts: Vec<u32>,
    pub travel_length: Vec<u32>,
    pub travel_angle: Vec<u32>,
    pub altitude_difference: Vec<u32>,
}

struct AtomicLayers {
    size: UVec2,
    combined: Vec<AtomicU32>,
    z_delta: Vec<AtomicU32>,
    cell_counts: Vec<AtomicU32>,
    travel_length: Vec<AtomicU32>,
    travel_angle: Vec<AtomicU32>,
    altitude_difference: Vec<AtomicU32>,
}

impl AtomicLayers {
    fn new(size: UVec2, layers: OutputLayers) -> Self {
        let n = (size.x * size.y) as usize;
        let alloc = |on: bool| (0..if on { n } else { 0 }).map(|_| AtomicU32::new(0)).collect::<Vec<_>>();
        Self {
            size,
            combined: alloc(true),
            z_delta: alloc(layers.z_delta),
            cell_counts: alloc(layers.cell_counts),
            travel_length: alloc(layers.travel_length),
            travel_angle: alloc(layers.travel_angle),
            altitude_difference: alloc(layers.altitude_difference),
        }
    }

    fn into_layers(self) -> TrajectoryLayers {
        let take = |v: Vec<AtomicU32>| v.into_iter().map(AtomicU32::into_inner).collect();
        TrajectoryLayers {
            size: self.size,
            combined: take(self.combined),
            z_delta: take(self.z_delta),
            cell_counts: take(self.cell_counts),
            travel_length: take(self.travel_length),
            travel_angle: take(self.travel_angle),
            altitude_difference: take(self.altitude_difference),
        }
    }
}

fn max_at(layer: &[AtomicU32], i: usize, value: f32) {
    if let Some(slot) = layer.get(i) {
        slot.fetch_max(encode_fixed(value), Ordering::Relaxed);
    }
}

struct Grid<'a> {
    size: UVec2,
    heights: &'a [f32],
    normals: &'a [Vec3],
}

impl Grid<'_> {
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.size.x + x) as usize
    }

    fn contains(&self, p: Vec2) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.size.x as f32 && p.y < self.size.y as f32
    }

    /// Bilinear weights around `p` with clamped texel indices.
    fn taps(&self, p: Vec2) -> [(usize, f32); 4] {
        let max = (self.size - UVec2::ONE).as_vec2();
        let q = (p - Vec2::splat(0.5)).clamp(Vec2::ZERO, max);
        let base = q.floor();
        let f = q - base;
        let x0 = base.x as u32;
        let y0 = base.y as u32;
        let x1 = (x0 + 1).min(self.size.x - 1);
        let y1 = (y0 + 1).min(self.size.y - 1);
        [
            (self.index(x0, y0), (1.0 - f.x) * (1.0 - f.y)),
            (self.index(x1, y0), f.x * (1.0 - f.y)),
            (self.index(x0, y1), (1.0 - f.x) * f.y),
            (self.index(x1, y1), f.x * f.y),
        ]
    }

    fn height(&self, p: Vec2) -> f32 {
        self.taps(p).iter().map(|(i, w)| self.heights[*i] * w).sum()
    }

    fn normal(&self, p: Vec2) -> Vec3 {
        self.taps(p).iter().map(|(i, w)| self.normals[*i] * *w).sum()
    }
}

/// Offsets of the D8 neighbourhood in texel space, in weight order.
const D8_OFFSETS: [(i32, i32); 8] = [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)];

struct Rng(u32);

impl Rng {
    fn next_f32(&mut self) -> f32 {
        self.0 = pcg_hash(self.0);
        self.0 as f32 / u32::MAX as f32
    }

    fn unit_vec(&mut self) -> Vec2 {
        let a = self.next_f32() * std::f32::consts::TAU;
        Vec2::new(a.cos(), a.sin())
    }
}

fn snap_to_octant(d: Vec2) -> Vec2 {
    let step = std::f32::consts::FRAC_PI_4;
    let a = (d.y.atan2(d.x) / step).round() * step;
    Vec2::new(a.cos(), a.sin())
}

/// Traces one path and writes it into `out`.
fn trace(grid: &Grid, out: &AtomicLayers, s: &TrajectorySettings, cell: UVec2, seed: u32, cell_size: f32) {
    let mut rng = Rng(pcg_hash(seed ^ pcg_hash(cell.y * grid.size.x + cell.x)));
    let multiplier = s.resolution_multiplier.max(1) as f32;
    let g = s.less_simple.gravity;
    let alpha = s.flowpy.alpha_deg.to_radians();

    let mut p = cell.as_vec2() + Vec2::splat(0.5);
    let start_height = grid.height(p);
    let mut prev_height = start_height;
    let mut prev_dir = Vec2::ZERO;
    let mut speed = 0.0f32;
    let mut speed_sq = 0.0f32;
    let mut perla_sq = 0.0f32;
    let mut length = 0.0f32;
    let mut last_pixel: Option<usize> = None;

    for _ in 0..s.num_steps {
        let (next, dir) = if s.physics_model.is_d8() {
            let c = p.floor().as_ivec2();
            let centre = grid.heights[grid.index(c.x as u32, c.y as u32)];
            let (weights, offset) = match s.physics_model {
                PhysicsModel::D8Weights => (s.d8.weights, s.d8.center_height_offset),
                _ => ([1.0; 8], 0.0),
            };
            let mut best: Option<(f32, glam::IVec2)> = None;
            for (k, (dx, dy)) in D8_OFFSETS.iter().enumerate() {
                let n = c + glam::IVec2::new(*dx, *dy);
                if n.x < 0 || n.y < 0 || n.x >= grid.size.x as i32 || n.y >= grid.size.y as i32 {
                    continue;
                }
                let distance = if *dx != 0 && *dy != 0 { std::f32::consts::SQRT_2 } else { 1.0 };
                let drop = centre + offset - grid.heights[grid.index(n.x as u32, n.y as u32)];
                let score = drop / distance * weights[k];
                if score > 0.0 && best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, n));
                }
            }
            let Some((_, n)) = best else { break };
            let next = n.as_vec2() + Vec2::splat(0.5);
            (next, (next - p).normalize_or_zero())
        } else {
            let n = grid.normal(p);
            let downhill = Vec2::new(n.x, -n.y);
            if downhill.length() < 1e-6 {
                break;
            }
            let d = downhill.normalize();
            let mut dir = d.lerp(rng.unit_vec(), s.random_contribution).try_normalize().unwrap_or(d);
            if prev_dir != Vec2::ZERO {
                dir = dir.lerp(prev_dir, s.persistence_contribution).try_normalize().unwrap_or(dir);
            }
            if s.physics_model == PhysicsModel::DiscretizedGradient {
                dir = snap_to_octant(dir);
            }
            (p + dir * s.step_length, dir)
        };

        if !grid.contains(next) {
            break;
        }
        let height = grid.height(next);
        let drop = prev_height - height;
        let ground = (next - p).length() * cell_size;
        let slope_distance = (ground * ground + drop * drop).sqrt();
        let (sin_t, cos_t) = if slope_distance > 0.0 { (drop / slope_distance, ground / slope_distance) } else { (0.0, 1.0) };
        let altitude_difference = start_height - height;

        match s.physics_model {
            PhysicsModel::Simple => {
                speed = speed * (1.0 - s.simple.slowdown_coefficient) + drop * s.simple.speedup_coefficient;
                if speed <= 0.0 {
                    break;
                }
                speed_sq = speed * speed;
            }
            PhysicsModel::LessSimple => {
                let m = &s.less_simple;
                let accel = m.gravity * (sin_t - m.friction_coeff * cos_t) - speed_sq * m.mass / m.drag_coeff;
                speed_sq += 2.0 * accel * slope_distance;
                if speed_sq <= 0.0 {
                    break;
                }
                speed = speed_sq.sqrt();
            }
            _ => {
                speed_sq = (2.0 * g * altitude_difference).max(0.0);
                speed = speed_sq.sqrt();
            }
        }

        length += ground;
        match s.runout_model {
            RunoutModel::None => {}
            RunoutModel::Perla => {
                let r = &s.perla;
                let beta = (-2.0 * slope_distance / r.md).exp();
                perla_sq = r.g * (sin_t - r.my * cos_t) * r.md * (1.0 - beta) + perla_sq * beta;
                if perla_sq <= 0.0 {
                    break;
                }
            }
            RunoutModel::Flowpy => {
                if length > 0.0 && altitude_difference.atan2(length) < alpha {
                    break;
                }
            }
        }

        let px = (next * multiplier).floor().as_uvec2().min(out.size - UVec2::ONE);
        let i = (px.y * out.size.x + px.x) as usize;
        if last_pixel != Some(i) {
            if let Some(count) = out.cell_counts.get(i) {
                count.fetch_add(1, Ordering::Relaxed);
            }
            last_pixel = Some(i);
        }
        max_at(&out.combined, i, speed);
        max_at(&out.z_delta, i, speed_sq / (2.0 * g));
        max_at(&out.travel_length, i, length);
        max_at(&out.travel_angle, i, altitude_difference.atan2(length).to_degrees());
        max_at(&out.altitude_difference, i, altitude_difference);

        p = next;
        prev_dir = dir;
        prev_height = height;
    }
}

/// Runs every path of every release cell; parallel over release cells.
pub fn simulate(inputs: &TrajectoryInputs, settings: &TrajectorySettings) -> TrajectoryLayers {
    let out_size = inputs.size * settings.resolution_multiplier.max(1);
    let out = AtomicLayers::new(out_size, settings.output_layers);
    let grid = Grid { size: inputs.size, heights: inputs.heights, normals: inputs.normals };

    let cells: Vec<UVec2> = inputs
        .release
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(i, _)| UVec2::new(i as u32 % inputs.size.x, i as u32 / inputs.size.x))
        .collect();

    cells.par_iter().for_each(|cell| {
        for run in 0..settings.num_runs {
            let seed = settings.random_seed.wrapping_add(run);
            for path in 0..settings.num_paths_per_release_cell {
                trace(&grid, &out, settings, *cell, pcg_hash(seed) ^ path, inputs.cell_size_m);
            }
        }
    });
    out.into_layers()
}

/// Finite-difference normals, same stencil as the normals shader.
pub fn normals_from_heights(heights: &[f32], size: UVec2, cell_size: Vec2) -> Vec<Vec3> {
    let at = |x: i64, y: i64| {
        let x = x.clamp(0, i64::from(size.x) - 1) as u32;
        let y = y.clamp(0, i64::from(size.y) - 1) as u32;
        heights[(y * size.x + x) as usize]
    };
    (0..size.y)
        .flat_map(|y| (0..size.x).map(move |x| (i64::from(x), i64::from(y))))
        .map(|(x, y)| {
            let dx = (at(x + 1, y) - at(x - 1, y)) / (2.0 * cell_size.x);
            // rows grow southwards
            let dy = (at(x, y - 1) - at(x, y + 1)) / (2.0 * cell_size.y);
            Vec3::new(-dx, -dy, 1.0).normalize()
        })
        .collect()
}

/// Flow direction codes of the D8 neighbourhood (E=1, SE=2, ... NE=128),
/// indexed like the neighbour offsets. `0` marks pits and flats.
pub const D8_CODES: [u8; 8] = [64, 128, 1, 2, 4, 8, 16, 32];

/// Code of the steepest downhill neighbour of a cell. `neighbours` holds the
/// heights in neighbour offset order; missing neighbours are ignored and the
/// first of equally steep neighbours wins.
pub fn d8_code(centre: f32, neighbours: [Option<f32>; 8]) -> u8 {
    let mut best = 0.0;
    let mut code = 0;
    for (k, height) in neighbours.iter().enumerate() {
        let Some(height) = height else { continue };
        let (dx, dy) = D8_OFFSETS[k];
        let mut slope = centre - height;
        if dx != 0 && dy != 0 {
            slope *= std::f32::consts::FRAC_1_SQRT_2;
        }
        if slope > best {
            best = slope;
            code = D8_CODES[k];
        }
    }
    code
}

/// D8 codes of a north-up raster; cells beyond the edge are missing.
pub fn d8_directions(heights: &[f32], size: UVec2) -> Vec<u8> {
    let at = |x: i32, y: i32| {
        let inside = x >= 0 && y >= 0 && x < size.x as i32 && y < size.y as i32;
        inside.then(|| heights[(y as u32 * size.x + x as u32) as usize])
    };
    (0..size.y as i32)
        .flat_map(|y| (0..size.x as i32).map(move |x| (x, y)))
        .map(|(x, y)| {
            let neighbours = D8_OFFSETS.map(|(dx, dy)| at(x + dx, y + dy));
            d8_code(heights[(y as u32 * size.x + x as u32) as usize], neighbours)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: f32 = 10.0;

    fn plane(size: UVec2, slope_deg: f32) -> Vec<f32> {
        let t = slope_deg.to_radians().tan();
        (0..size.y).flat_map(|_| (0..size.x).map(move |x| 3000.0 - t * (x as f32 + 0.5) * CELL)).collect()
    }

    fn settings() -> TrajectorySettings {
        TrajectorySettings {
            random_contribution: 0.0,
            num_paths_per_release_cell: 1,
            num_runs: 1,
            random_seed: 1,
            ..Default::default()
        }
    }

    fn run(size: UVec2, heights: &[f32], release_at: UVec2, settings: &TrajectorySettings) -> TrajectoryLayers {
        let normals = normals_from_heights(heights, size, Vec2::splat(CELL));
        let mut release = vec![false; (size.x * size.y) as usize];
        release[(release_at.y * size.x + release_at.x) as usize] = true;
        let inputs = TrajectoryInputs { size, heights, normals: &normals, release: &release, cell_size_m: CELL };
        simulate(&inputs, settings)
    }

    #[test]
    fn d8_picks_the_steepest_drop() {
        // a cardinal drop of 10 beats a diagonal drop of 12 (12 / sqrt 2 < 10)
        let mut n = [None; 8];
        n[2] = Some(90.0);
        n[3] = Some(88.0);
        assert_eq!(d8_code(100.0, n), 1);
        n[7] = Some(80.0);
        assert_eq!(d8_code(100.0, n), 32);
        assert_eq!(d8_code(100.0, [Some(100.0); 8]), 0);
        assert_eq!(d8_code(100.0, [None; 8]), 0);
    }

    #[test]
    fn d8_raster_drains_towards_the_low_corner() {
        let size = UVec2::new(3, 3);
        // lowest in the south east corner
        let heights: Vec<f32> = (0..3).flat_map(|y| (0..3).map(move |x| 10.0 - (x + y) as f32)).collect();
        let codes = d8_directions(&heights, size);
        assert_eq!(codes[0], 2);
        assert_eq!(codes[4], 2);
        assert_eq!(codes[2], 4);
        assert_eq!(codes[6], 1);
        assert_eq!(codes[8], 0);
    }

    #[test]
    fn fixed_point_preserves_order() {
        let values = [-1234.5f32, -1.0, -0.001, 0.0, 0.001, 2.5, 90.0, 1.0e5];
        let raw: Vec<u32> = values.iter().map(|v| encode_fixed(*v)).collect();
        assert!(raw.windows(2).all(|w| w[0] < w[1]));
        assert!(raw.iter().all(|r| *r != 0));
        for (v, r) in values.iter().zip(&raw) {
            assert!((decode_fixed(*r) - v).abs() < 1e-3);
        }
    }

    #[test]
    fn flat_ground_writes_nothing() {
        let size = UVec2::new(16, 16);
        let layers = run(size, &vec![1500.0; 256], UVec2::new(8, 8), &settings());
        for layer in [&layers.combined, &layers.z_delta, &layers.cell_counts, &layers.travel_length, &layers.travel_angle, &layers.altitude_difference] {
            assert!(layer.iter().all(|w| *w == 0));
        }
    }

    #[test]
    fn travel_angle_matches_plane_slope() {
        let size = UVec2::new(64, 16);
        let slope = 30.0;
        let layers = run(size, &plane(size, slope), UVec2::new(2, 8), &settings());

        let furthest = (0..layers.travel_length.len())
            .max_by(|a, b| decode_fixed(layers.travel_length[*a]).total_cmp(&decode_fixed(layers.travel_length[*b])))
            .unwrap();
        assert!(decode_fixed(layers.travel_length[furthest]) > 40.0 * CELL);
        let angle = decode_fixed(layers.travel_angle[furthest]);
        assert!((angle - slope).abs() < 0.5, "angle {angle}");
        // straight downhill along the release row
        assert_eq!(furthest as u32 / size.x, 8);
    }

    #[test]
    fn flowpy_stops_on_gentle_slopes() {
        let size = UVec2::new(64, 16);
        let s = TrajectorySettings { runout_model: RunoutModel::Flowpy, ..settings() };
        let gentle = run(size, &plane(size, 15.0), UVec2::new(2, 8), &s);
        assert!(gentle.cell_counts.iter().all(|c| *c == 0));
        let steep = run(size, &plane(size, 30.0), UVec2::new(2, 8), &s);
        assert!(steep.cell_counts.iter().filter(|c| **c > 0).count() > 40);
    }

    #[test]
    fn d8_follows_the_steepest_neighbour() {
        let size = UVec2::new(32, 8);
        let s = TrajectorySettings { physics_model: PhysicsModel::D8NoWeights, ..settings() };
        let layers = run(size, &plane(size, 20.0), UVec2::new(1, 4), &s);
        let visited: Vec<usize> = (0..layers.cell_counts.len()).filter(|i| layers.cell_counts[*i] > 0).collect();
        assert_eq!(visited.len(), 30);
        assert!(visited.iter().all(|i| *i as u32 / size.x == 4));
    }

    #[test]
    fn resolution_multiplier_scales_outputs() {
        let size = UVec2::new(32, 8);
        let s = TrajectorySettings { resolution_multiplier: 2, ..settings() };
        let layers = run(size, &plane(size, 30.0), UVec2::new(1, 4), &s);
        assert_eq!(layers.size, UVec2::new(64, 16));
        assert_eq!(layers.cell_counts.len(), 64 * 16);
    }

    #[test]
    fn disabled_layers_are_not_allocated() {
        let size = UVec2::new(8, 8);
        let s = TrajectorySettings {
            output_layers: OutputLayers { travel_angle: false, ..Default::default() },
            ..settings()
        };
        let layers = run(size, &plane(size, 30.0), UVec2::new(1, 4), &s);
        assert!(layers.travel_angle.is_empty());
        assert_eq!(s.output_layers.bits(), 0b10111);
    }
}
