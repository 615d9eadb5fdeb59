//! Headless GPU compute graph for terrain overlays.
//!
//! Nodes exchange typed [`Data`] over named sockets and are run by a
//! [`NodeGraph`] in topological order on one [`GpuContext`]. The
//! [`graphs`] module assembles the standard pipelines (normals, snow,
//! avalanche trajectories, iterative flux, tile pyramids) over a target
//! region; [`kernel`] holds the CPU reference of the trajectory kernel.

pub mod buffer;
pub mod context;
pub mod error;
pub mod graph;
pub mod graphs;
pub mod hash_map;
pub mod kernel;
pub mod node;
pub mod nodes;
pub mod pipeline;
pub mod settings;
pub mod storage;
pub mod texture;

pub use buffer::{ElementKind, RawBuffer};
pub use context::GpuContext;
pub use error::ComputeError;
pub use graph::{GraphEvent, GraphEventKind, GraphRunFailureInfo, GraphRunReport, NodeGraph, NodeRunFailureInfo};
pub use graphs::{ElevationSources, GraphKind};
pub use hash_map::GpuHashMap;
pub use node::{Data, DataType, Node};
pub use settings::{ComputePipelineSettings, TileSource};
pub use storage::TileStorageTexture;
pub use texture::TextureWithSampler;
