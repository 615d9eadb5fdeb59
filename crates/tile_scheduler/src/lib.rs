//! Camera-driven tile scheduling and GPU residency bookkeeping.
//!
//! The scheduler executor owns every [`Scheduler`], its [`LayerAssembler`],
//! RAM cache and load services. Everything else talks to it through the
//! message types in [`service`].

pub mod aabb_decorator;
pub mod cache;
pub mod camera;
pub mod director;
pub mod error;
pub mod gpu_array_helper;
pub mod layer_assembler;
pub mod load_service;
pub mod network;
pub mod reachability;
pub mod scheduler;
pub mod service;
pub mod tile_types;

pub use director::Director;
pub use error::SchedulerError;
pub use layer_assembler::LayerAssembler;
pub use load_service::{TileLoadService, UrlPattern};
pub use scheduler::{tiles_in_region, GpuQuadsUpdate, GpuTile, Scheduler, SchedulerEvent, SchedulerSettings, Statistics};
pub use tile_types::{Layer, LayeredTile, TileLayer};
