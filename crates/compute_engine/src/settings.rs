//! Persisted settings of the compute pipelines.

use crate::error::Result;
use crate::kernel::{PhysicsModel, RunoutModel, TrajectorySettings};
use crate::nodes::buffer_to_texture::BufferToTextureSettings;
use crate::nodes::release_points::ReleasePointsSettings;
use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tile_core::Aabb2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileSource {
    /// Terrain model, bare ground.
    #[default]
    Dtm,
    /// Surface model, includes vegetation and buildings.
    Dsm,
}

/// Settings shared by the pipeline graph factories. Unknown keys are
/// ignored and missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputePipelineSettings {
    pub tile_source: TileSource,
    pub source_zoomlevel: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_region: Option<Aabb2>,
    /// Extent file read when `target_region` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_aabb_file: Option<PathBuf>,
    /// Image used as release point texture instead of the slope classifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_points_file: Option<PathBuf>,
    pub release_point_interval: u32,
    pub trigger_point_min_slope_angle: f32,
    pub trigger_point_max_slope_angle: f32,
    pub num_steps: u32,
    pub num_paths_per_release_cell: u32,
    pub random_contribution: f32,
    pub persistence_contribution: f32,
    pub alpha: f32,
    pub trajectory_resolution_multiplier: u32,
    pub random_seed: u32,
    pub num_runs: u32,
    pub step_length: f32,
    pub physics_model: PhysicsModel,
    pub runout_model: RunoutModel,
}

impl Default for ComputePipelineSettings {
    fn default() -> Self {
        let trajectories = TrajectorySettings::default();
        Self {
            tile_source: TileSource::Dtm,
            source_zoomlevel: 15,
            target_region: None,
            region_aabb_file: None,
            release_points_file: None,
            release_point_interval: 8,
            trigger_point_min_slope_angle: 30.0,
            trigger_point_max_slope_angle: 45.0,
            num_steps: trajectories.num_steps,
            num_paths_per_release_cell: trajectories.num_paths_per_release_cell,
            random_contribution: trajectories.random_contribution,
            persistence_contribution: trajectories.persistence_contribution,
            alpha: trajectories.flowpy.alpha_deg,
            trajectory_resolution_multiplier: trajectories.resolution_multiplier,
            random_seed: trajectories.random_seed,
            num_runs: trajectories.num_runs,
            step_length: trajectories.step_length,
            physics_model: trajectories.physics_model,
            runout_model: trajectories.runout_model,
        }
    }
}

impl ComputePipelineSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn trajectory_settings(&self) -> TrajectorySettings {
        let mut s = TrajectorySettings {
            num_steps: self.num_steps.max(1),
            step_length: self.step_length,
            num_paths_per_release_cell: self.num_paths_per_release_cell.max(1),
            num_runs: self.num_runs.max(1),
            random_contribution: self.random_contribution.clamp(0.0, 1.0),
            persistence_contribution: self.persistence_contribution.clamp(0.0, 1.0),
            random_seed: self.random_seed,
            resolution_multiplier: self.trajectory_resolution_multiplier.max(1),
            physics_model: self.physics_model,
            runout_model: self.runout_model,
            ..Default::default()
        };
        s.flowpy.alpha_deg = self.alpha;
        s
    }

    pub fn release_points_settings(&self) -> ReleasePointsSettings {
        ReleasePointsSettings {
            min_slope_angle_deg: self.trigger_point_min_slope_angle,
            max_slope_angle_deg: self.trigger_point_max_slope_angle,
            sampling_interval: UVec2::splat(self.release_point_interval.max(1)),
        }
    }

    /// Colour mapping of the trajectory overlay; cell counts drive transparency.
    pub fn buffer_to_texture_settings(&self) -> BufferToTextureSettings {
        BufferToTextureSettings {
            color_map_bounds: Vec2::new(0.0, 40.0),
            transparency_map_bounds: Vec2::new(0.0, 1.0),
            use_bin_interpolation: false,
            use_transparency_buffer: true,
        }
    }
}
