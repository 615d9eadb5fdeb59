use clap::Parser;
use std::path::PathBuf;

/// `terrain_streamer` - headless driver of the terrain tile scheduler.
///
/// Streams height and ortho tiles for a scripted camera flight, keeps the
/// GPU residency bookkeeping up to date and optionally runs one compute
/// graph over the region below the camera.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Base url of the elevation tile server, e.g. `https://{s}.example.org/dtm/`.
    ///
    /// `file://` urls are read from the local filesystem.
    #[arg(long, env = "TERRAIN_HEIGHT_URL")]
    pub height_url: String,

    /// Path layout of the elevation server: zxy, zyx, zxy_yflip or zyx_yflip.
    #[arg(long, env = "TERRAIN_HEIGHT_URL_PATTERN", default_value = "zxy")]
    pub height_url_pattern: String,

    #[arg(long, env = "TERRAIN_HEIGHT_FILE_ENDING", default_value = ".png")]
    pub height_file_ending: String,

    /// Base url of the surface model (dsm) server used by compute graphs whose
    /// pipeline settings select `tile_source: dsm`.
    #[arg(long, env = "TERRAIN_DSM_URL")]
    pub dsm_url: Option<String>,

    #[arg(long, env = "TERRAIN_DSM_URL_PATTERN", default_value = "zxy")]
    pub dsm_url_pattern: String,

    #[arg(long, env = "TERRAIN_DSM_FILE_ENDING", default_value = ".png")]
    pub dsm_file_ending: String,

    /// Base url of the orthophoto tile server.
    #[arg(long, env = "TERRAIN_ORTHO_URL")]
    pub ortho_url: String,

    #[arg(long, env = "TERRAIN_ORTHO_URL_PATTERN", default_value = "zxy_yflip")]
    pub ortho_url_pattern: String,

    #[arg(long, env = "TERRAIN_ORTHO_FILE_ENDING", default_value = ".jpeg")]
    pub ortho_file_ending: String,

    /// Optional vector tile server, assembled together with the ortho layer.
    #[arg(long, env = "TERRAIN_VECTOR_URL")]
    pub vector_url: Option<String>,

    #[arg(long, env = "TERRAIN_VECTOR_URL_PATTERN", default_value = "zxy_yflip")]
    pub vector_url_pattern: String,

    #[arg(long, env = "TERRAIN_VECTOR_FILE_ENDING", default_value = ".pbf")]
    pub vector_file_ending: String,

    /// Hosts substituted for `{s}` in the tile urls, comma separated.
    #[arg(long, env = "TERRAIN_LOAD_BALANCING_TARGETS", value_delimiter = ',')]
    pub load_balancing_targets: Vec<String>,

    /// Upper bound on quads resident on the GPU per scheduler.
    #[arg(long, env = "TERRAIN_QUAD_LIMIT", default_value_t = 512)]
    pub quad_limit: usize,

    /// Number of assembled tiles kept in RAM per scheduler.
    #[arg(long, env = "TERRAIN_RAM_CACHE_SIZE", default_value_t = 4096)]
    pub ram_cache_size: usize,

    /// Camera updates are coalesced to at most this rate.
    #[arg(long, env = "TERRAIN_UPDATE_RATE_HZ", default_value_t = 5.0)]
    pub update_rate_hz: f64,

    /// The listen address of the Prometheus metrics server.
    #[arg(long, env = "TERRAIN_METRICS_LISTEN_ADDR", default_value = "0.0.0.0:9102")]
    pub metrics_listen_addr: String,

    /// Url checked periodically to decide whether the tile servers are reachable.
    #[arg(long, env = "TERRAIN_REACHABILITY_URL")]
    pub reachability_url: Option<String>,

    #[arg(long, env = "TERRAIN_REACHABILITY_INTERVAL_S", default_value_t = 10)]
    pub reachability_interval_s: u64,

    /// Latitude the camera circles around, in degrees.
    #[arg(long, env = "TERRAIN_CAMERA_LAT", default_value_t = 47.074)]
    pub camera_lat: f64,

    /// Longitude the camera circles around, in degrees.
    #[arg(long, env = "TERRAIN_CAMERA_LON", default_value_t = 12.694)]
    pub camera_lon: f64,

    /// Camera altitude above the datum, in metres.
    #[arg(long, env = "TERRAIN_CAMERA_ALT", default_value_t = 5000.0)]
    pub camera_alt: f64,

    /// Radius of the scripted orbit, in metres.
    #[arg(long, env = "TERRAIN_ORBIT_RADIUS_M", default_value_t = 8000.0)]
    pub orbit_radius_m: f64,

    /// Seconds per full orbit.
    #[arg(long, env = "TERRAIN_ORBIT_PERIOD_S", default_value_t = 120.0)]
    pub orbit_period_s: f64,

    /// Pipeline settings JSON for the compute graph.
    #[arg(long, env = "TERRAIN_PIPELINE_SETTINGS")]
    pub pipeline_settings: Option<PathBuf>,

    /// Compute graph to run once at startup: normals, snow, trajectories,
    /// iterative_simulation, tile_pyramid or d8_directions.
    #[arg(long, env = "TERRAIN_COMPUTE_GRAPH")]
    pub compute_graph: Option<String>,

    /// Half edge of the compute region around the orbit centre, in metres,
    /// used when the pipeline settings carry no target region.
    #[arg(long, env = "TERRAIN_COMPUTE_REGION_HALF_EDGE_M", default_value_t = 1500.0)]
    pub compute_region_half_edge_m: f64,
}
