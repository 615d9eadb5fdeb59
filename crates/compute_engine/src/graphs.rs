//! Ready-made graphs over a target region.
//!
//! Every factory starts with a `select_tiles` node over
//! [`ComputePipelineSettings::target_region`] at `source_zoomlevel` and a
//! `request_tiles` node backed by the given load service. Without a target
//! region the region is read from `region_aabb_file` by a `load_region` node. [`GraphKind::create`]
//! picks that service from [`ElevationSources`] by the settings' `tile_source`.

use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::graph::NodeGraph;
use crate::nodes::create_hash_map::CreateHashMapSettings;
use crate::nodes::d8_directions::D8Settings;
use crate::nodes::downsample::DownsampleSettings;
use crate::nodes::iterative_simulation::IterativeSimulationSettings;
use crate::nodes::load_region_aabb::LoadRegionAabbSettings;
use crate::nodes::load_texture::LoadTextureSettings;
use crate::nodes::snow::SnowSettings;
use crate::nodes::tile_stitch::TileStitchSettings;
use crate::nodes::upsample::UpsampleSettings;
use crate::nodes::{
    BufferToTextureNode, ComputeAvalancheTrajectoriesNode, ComputeNormalsNode, ComputeReleasePointsNode, ComputeSnowNode,
    CreateHashMapNode, D8DirectionsNode, DownsampleTilesNode, FxaaNode, HeightDecodeNode, IterativeSimulationNode,
    LoadRegionAabbNode, LoadTextureNode, RequestTilesNode, SelectTilesNode, TileStitchNode, UpsampleTexturesNode,
};
use crate::settings::{ComputePipelineSettings, TileSource};
use std::str::FromStr;
use std::sync::Arc;
use tile_core::Scheme;
use tile_scheduler::{tiles_in_region, TileLoadService};

/// Node and socket whose output a caller typically consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOutput {
    pub node: &'static str,
    pub socket: &'static str,
}

/// Elevation services a graph may request its tiles from.
#[derive(Debug, Clone)]
pub struct ElevationSources {
    pub dtm: TileLoadService,
    pub dsm: Option<TileLoadService>,
}

impl ElevationSources {
    pub fn new(dtm: TileLoadService) -> Self {
        Self { dtm, dsm: None }
    }

    pub fn with_dsm(mut self, dsm: TileLoadService) -> Self {
        self.dsm = Some(dsm);
        self
    }

    pub fn service(&self, source: TileSource) -> Result<TileLoadService> {
        match source {
            TileSource::Dtm => Ok(self.dtm.clone()),
            TileSource::Dsm => self
                .dsm
                .clone()
                .ok_or_else(|| ComputeError::InvalidInput("tile source 'dsm' has no configured service".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Normals,
    Snow,
    Trajectories,
    IterativeSimulation,
    TilePyramid,
    D8Directions,
}

impl FromStr for GraphKind {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "normals" => Ok(Self::Normals),
            "snow" => Ok(Self::Snow),
            "trajectories" | "avalanche_trajectories" => Ok(Self::Trajectories),
            "iterative_simulation" => Ok(Self::IterativeSimulation),
            "tile_pyramid" => Ok(Self::TilePyramid),
            "d8_directions" | "d8" => Ok(Self::D8Directions),
            _ => Err(ComputeError::InvalidInput(format!("unknown compute graph '{s}'"))),
        }
    }
}

impl GraphKind {
    pub fn create(
        self,
        ctx: Arc<GpuContext>,
        settings: &ComputePipelineSettings,
        sources: &ElevationSources,
    ) -> Result<(NodeGraph, GraphOutput)> {
        let service = sources.service(settings.tile_source)?;
        tracing::debug!(graph = ?self, source = ?settings.tile_source, url = service.base_url(), "creating compute graph");
        let graph = match self {
            Self::Normals => create_normals_graph(ctx, settings, service)?,
            Self::Snow => create_snow_graph(ctx, settings, service)?,
            Self::Trajectories => create_trajectories_graph(ctx, settings, service)?,
            Self::IterativeSimulation => create_iterative_simulation_graph(ctx, settings, service)?,
            Self::TilePyramid => create_tile_pyramid_graph(ctx, settings, service)?,
            Self::D8Directions => create_d8_graph(ctx, settings, service)?,
        };
        Ok((graph, self.output()))
    }

    pub fn output(self) -> GraphOutput {
        let (node, socket) = match self {
            Self::Normals => ("normals", "normal texture"),
            Self::Snow => ("snow", "snow texture"),
            Self::Trajectories => ("fxaa", "texture"),
            Self::IterativeSimulation => ("iterative_simulation", "texture"),
            Self::TilePyramid => ("downsample", "textures"),
            Self::D8Directions => ("d8_directions", "d8 direction textures"),
        };
        GraphOutput { node, socket }
    }
}

fn add_tile_source(graph: &mut NodeGraph, settings: &ComputePipelineSettings, service: TileLoadService) -> Result<()> {
    match (settings.target_region, &settings.region_aabb_file) {
        (Some(region), _) => {
            graph.add_node("select_tiles", SelectTilesNode::with_region(region, settings.source_zoomlevel))?;
        }
        (None, Some(file_path)) => {
            let load = LoadRegionAabbNode::new(LoadRegionAabbSettings { file_path: file_path.clone() });
            graph.add_node("load_region", load)?;
            graph.add_node("select_tiles", SelectTilesNode::with_input_region(settings.source_zoomlevel))?;
            graph.connect_output_to("load_region", "region aabb", "select_tiles", "region aabb")?;
        }
        (None, None) => {
            return Err(ComputeError::InvalidInput("pipeline settings carry no target region or region file".into()));
        }
    }
    graph.add_node("request_tiles", RequestTilesNode::new(service))?;
    graph.connect_output_to("select_tiles", "tile ids", "request_tiles", "tile ids")
}

/// Node and socket of the release point texture: a loaded mask when
/// `release_points_file` is set, else the slope classifier over the normals.
fn add_release_points(
    graph: &mut NodeGraph,
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
) -> Result<(&'static str, &'static str)> {
    if let Some(file_path) = &settings.release_points_file {
        graph.add_node("load_release_points", LoadTextureNode::new(ctx, LoadTextureSettings { file_path: file_path.clone() }))?;
        return Ok(("load_release_points", "texture"));
    }
    graph.add_node("release_points", ComputeReleasePointsNode::new(ctx, settings.release_points_settings()))?;
    graph.connect_output_to("normals", "normal texture", "release_points", "normal texture")?;
    Ok(("release_points", "release point texture"))
}

/// select → request → stitch → decode → normals
pub fn create_normals_graph(
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
    service: TileLoadService,
) -> Result<NodeGraph> {
    let mut graph = NodeGraph::new();
    add_tile_source(&mut graph, settings, service)?;
    graph.add_node("stitch", TileStitchNode::new(ctx.clone(), TileStitchSettings::default()))?;
    graph.add_node("decode", HeightDecodeNode::new(ctx.clone()))?;
    graph.add_node("normals", ComputeNormalsNode::new(ctx))?;

    graph.connect_output_to("select_tiles", "tile ids", "stitch", "tile ids")?;
    graph.connect_output_to("request_tiles", "tile data", "stitch", "tile data")?;
    graph.connect_output_to("stitch", "texture", "decode", "encoded texture")?;
    graph.connect_output_to("stitch", "region aabb", "normals", "region aabb")?;
    graph.connect_output_to("decode", "height texture", "normals", "height texture")?;
    Ok(graph)
}

pub fn create_snow_graph(
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
    service: TileLoadService,
) -> Result<NodeGraph> {
    let mut graph = create_normals_graph(ctx.clone(), settings, service)?;
    graph.add_node("snow", ComputeSnowNode::new(ctx, SnowSettings::default()))?;
    graph.connect_output_to("stitch", "region aabb", "snow", "region aabb")?;
    graph.connect_output_to("normals", "normal texture", "snow", "normal texture")?;
    graph.connect_output_to("decode", "height texture", "snow", "height texture")?;
    Ok(graph)
}

/// The normals graph extended by release points, trajectories, colour
/// mapping and anti-aliasing. Cell counts drive the overlay transparency.
pub fn create_trajectories_graph(
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
    service: TileLoadService,
) -> Result<NodeGraph> {
    let mut graph = create_normals_graph(ctx.clone(), settings, service)?;
    let release = add_release_points(&mut graph, ctx.clone(), settings)?;
    graph.add_node("trajectories", ComputeAvalancheTrajectoriesNode::new(ctx.clone(), settings.trajectory_settings()))?;
    graph.add_node("buffer_to_texture", BufferToTextureNode::new(ctx.clone(), settings.buffer_to_texture_settings()))?;
    graph.add_node("fxaa", FxaaNode::new(ctx))?;

    graph.connect_output_to("stitch", "region aabb", "trajectories", "region aabb")?;
    graph.connect_output_to("normals", "normal texture", "trajectories", "normal texture")?;
    graph.connect_output_to("decode", "height texture", "trajectories", "height texture")?;
    graph.connect_output_to(release.0, release.1, "trajectories", "release point texture")?;
    graph.connect_output_to("trajectories", "raster dimensions", "buffer_to_texture", "raster dimensions")?;
    graph.connect_output_to("trajectories", "storage buffer", "buffer_to_texture", "storage buffer")?;
    graph.connect_output_to("trajectories", "cell counts", "buffer_to_texture", "transparency buffer")?;
    graph.connect_output_to("buffer_to_texture", "texture", "fxaa", "texture")?;
    Ok(graph)
}

pub fn create_iterative_simulation_graph(
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
    service: TileLoadService,
) -> Result<NodeGraph> {
    let mut graph = create_normals_graph(ctx.clone(), settings, service)?;
    let release = add_release_points(&mut graph, ctx.clone(), settings)?;
    graph.add_node("iterative_simulation", IterativeSimulationNode::new(ctx, IterativeSimulationSettings::default()))?;

    graph.connect_output_to("decode", "height texture", "iterative_simulation", "height texture")?;
    graph.connect_output_to(release.0, release.1, "iterative_simulation", "release point texture")?;
    Ok(graph)
}

/// select → request → hashmap → upsample → downsample. The downsample node
/// adds one coarser level of parents to the upsampled storage.
pub fn create_tile_pyramid_graph(
    ctx: Arc<GpuContext>,
    settings: &ComputePipelineSettings,
    service: TileLoadService,
) -> Result<NodeGraph> {
    let mut graph = NodeGraph::new();
    add_tile_source(&mut graph, settings, service)?;
    let hash_map_settings = CreateHashMapSettings { capacity: tile_capacity(settings), ..Default::default() };
    graph.add_node("create_hash_map", CreateHashMapNode::new(ctx.clone(), hash_map_settings)?)?;
    graph.add_node("upsample", UpsampleTexturesNode::new(ctx.clone(), UpsampleSettings::default()))?;
    graph.add_node("downsample", DownsampleTilesNode::new(ctx, DownsampleSettings::default()))?;

    graph.connect_output_to("select_tiles", "tile ids", "create_hash_map", "tile ids")?;
    graph.connect_output_to("request_tiles", "tile data", "create_hash_map", "tile data")?;
    graph.connect_output_to("create_hash_map", "textures", "upsample", "source textures")?;
    graph.connect_output_to("select_tiles", "tile ids", "downsample", "tile ids")?;
    graph.connect_output_to("create_hash_map", "hash map", "downsample", "hash map")?;
    graph.connect_output_to("upsample", "output textures", "downsample", "textures")?;
    Ok(graph)
}

/// Layers for the selected tiles and every coarser level above them. A
/// region read from file is only known at run time and gets the maximum.
fn tile_capacity(settings: &ComputePipelineSettings) -> usize {
    settings.target_region.map_or(256, |region| {
        (tiles_in_region(&region, settings.source_zoomlevel, Scheme::Tms).len() * 2).clamp(4, 256)
    })
}

/// select → request → hashmap (raw 16 bit heights) → d8 directions. Codes of
/// texels on the selection border only see neighbours inside the selection.
pub fn create_d8_graph(ctx: Arc<GpuContext>, settings: &ComputePipelineSettings, service: TileLoadService) -> Result<NodeGraph> {
    let mut graph = NodeGraph::new();
    add_tile_source(&mut graph, settings, service)?;
    let capacity = tile_capacity(settings);
    let hash_map_settings =
        CreateHashMapSettings { capacity, format: wgpu::TextureFormat::R16Uint, ..Default::default() };
    graph.add_node("create_hash_map", CreateHashMapNode::new(ctx.clone(), hash_map_settings)?)?;
    graph.add_node("d8_directions", D8DirectionsNode::new(ctx, D8Settings { capacity }))?;

    graph.connect_output_to("select_tiles", "tile ids", "create_hash_map", "tile ids")?;
    graph.connect_output_to("request_tiles", "tile data", "create_hash_map", "tile data")?;
    graph.connect_output_to("select_tiles", "tile ids", "d8_directions", "tile ids")?;
    graph.connect_output_to("create_hash_map", "hash map", "d8_directions", "hash map")?;
    graph.connect_output_to("create_hash_map", "textures", "d8_directions", "height textures")?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use crate::node::Data;
    use crate::nodes::normals::decode_normal;
    use crate::nodes::upsample::tests::read_layer;
    use crate::storage::tests::png;
    use tile_core::{encode_height_rgb, srs, Aabb2, Id, Scheme};
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tile_scheduler::UrlPattern;

    fn settings_inside(id: Id) -> ComputePipelineSettings {
        let tile = srs::tile_bounds(id);
        let region = Aabb2::new(tile.min + tile.size() * 0.25, tile.max - tile.size() * 0.25);
        ComputePipelineSettings { target_region: Some(region), source_zoomlevel: id.zoom_level, ..Default::default() }
    }

    fn file_service(dir: &std::path::Path) -> TileLoadService {
        TileLoadService::new(format!("file://{}/", dir.display()), UrlPattern::Zxy, ".png").unwrap()
    }

    fn write_flat_tile(dir: &std::path::Path, id: Id, height: f32) {
        let tile_dir = dir.join(id.zoom_level.to_string()).join(id.coords.x.to_string());
        std::fs::create_dir_all(&tile_dir).unwrap();
        let [r, g, b] = encode_height_rgb(height);
        std::fs::write(tile_dir.join(format!("{}.png", id.coords.y)), png(256, [r, g, b, 255])).unwrap();
    }

    #[test]
    fn tile_source_picks_the_elevation_service() {
        let dtm = tempfile::tempdir().unwrap();
        let dsm = tempfile::tempdir().unwrap();
        let sources = ElevationSources::new(file_service(dtm.path())).with_dsm(file_service(dsm.path()));
        assert!(sources.service(TileSource::Dtm).unwrap().base_url().contains(&*dtm.path().to_string_lossy()));
        assert!(sources.service(TileSource::Dsm).unwrap().base_url().contains(&*dsm.path().to_string_lossy()));

        let dtm_only = ElevationSources::new(file_service(dtm.path()));
        assert!(matches!(dtm_only.service(TileSource::Dsm), Err(ComputeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn dsm_graphs_request_from_the_surface_model() {
        let Some(ctx) = context().await else { return };
        let id = Id::new(3, 4, 5, Scheme::Tms);
        let dtm = tempfile::tempdir().unwrap();
        let dsm = tempfile::tempdir().unwrap();
        write_flat_tile(dsm.path(), id, 800.0);
        let sources = ElevationSources::new(file_service(dtm.path())).with_dsm(file_service(dsm.path()));

        let dsm_settings = ComputePipelineSettings { tile_source: TileSource::Dsm, ..settings_inside(id) };
        let (mut graph, _) = GraphKind::Normals.create(ctx.clone(), &dsm_settings, &sources).unwrap();
        graph.run().await.unwrap();

        let (mut graph, _) = GraphKind::Normals.create(ctx, &settings_inside(id), &sources).unwrap();
        assert_eq!(graph.run().await.unwrap_err().node_name, "request_tiles");
    }

    #[test]
    fn graph_kinds_parse() {
        assert_eq!("tile-pyramid".parse::<GraphKind>().unwrap(), GraphKind::TilePyramid);
        assert_eq!("Trajectories".parse::<GraphKind>().unwrap(), GraphKind::Trajectories);
        assert_eq!("d8".parse::<GraphKind>().unwrap(), GraphKind::D8Directions);
        assert!("raytracing".parse::<GraphKind>().is_err());
    }

    #[tokio::test]
    async fn region_file_feeds_the_tile_selection() {
        let Some(ctx) = context().await else { return };
        let dir = tempfile::tempdir().unwrap();
        let region = settings_inside(Id::new(6, 33, 40, Scheme::Tms)).target_region.unwrap();
        let region_file = dir.path().join("region.txt");
        let extent = format!("{}\n{}\n{}\n{}\n", region.min.x, region.min.y, region.max.x, region.max.y);
        std::fs::write(&region_file, extent).unwrap();

        let settings = ComputePipelineSettings {
            target_region: None,
            region_aabb_file: Some(region_file),
            source_zoomlevel: 6,
            ..Default::default()
        };
        let mut graph = create_normals_graph(ctx, &settings, file_service(dir.path())).unwrap();
        assert_eq!(graph.execution_order()[0], "load_region");
        assert_eq!(graph.run().await.unwrap_err().node_name, "request_tiles");
        let Some(Data::TileIds(ids)) = graph.output("select_tiles", "tile ids").unwrap() else { panic!("no ids") };
        assert_eq!(*ids, vec![Id::new(6, 33, 40, Scheme::Tms)]);
    }

    #[tokio::test]
    async fn release_points_file_replaces_the_slope_classifier() {
        let Some(ctx) = context().await else { return };
        let dir = tempfile::tempdir().unwrap();
        let settings = ComputePipelineSettings {
            release_points_file: Some(dir.path().join("mask.png")),
            ..settings_inside(Id::new(12, 2200, 2650, Scheme::Tms))
        };
        let graph = create_trajectories_graph(ctx, &settings, file_service(dir.path())).unwrap();
        let order = graph.execution_order();
        assert!(order.contains(&"load_release_points"));
        assert!(!order.contains(&"release_points"));
        let at = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(at("load_release_points") < at("trajectories"));
    }

    #[tokio::test]
    async fn d8_graph_drains_an_eastward_slope() {
        let Some(ctx) = context().await else { return };
        let id = Id::new(6, 33, 40, Scheme::Tms);
        let dir = tempfile::tempdir().unwrap();
        let tile_dir = dir.path().join("6").join("33");
        std::fs::create_dir_all(&tile_dir).unwrap();
        // packed height (r << 8) | g falls towards the east
        let slope = RgbaImage::from_fn(256, 256, |x, _| Rgba([0, (255 - x) as u8, 0, 255]));
        let mut encoded = Cursor::new(Vec::new());
        slope.write_to(&mut encoded, ImageOutputFormat::Png).unwrap();
        std::fs::write(tile_dir.join("40.png"), encoded.into_inner()).unwrap();

        let sources = ElevationSources::new(file_service(dir.path()));
        let (mut graph, output) = GraphKind::D8Directions.create(ctx.clone(), &settings_inside(id), &sources).unwrap();
        graph.run().await.unwrap();

        let Some(Data::TileStorage(directions)) = graph.output(output.node, output.socket).unwrap() else {
            panic!("no directions")
        };
        let codes: Vec<u8> = read_layer(&ctx, &directions.read(), 0).await.chunks_exact(4).map(|t| t[0]).collect();
        assert_eq!(codes[128 * 256 + 10], 1);
        assert_eq!(codes[255], 0);
        assert_eq!(codes.iter().filter(|c| **c == 1).count(), 255 * 256);
    }

    #[tokio::test]
    async fn graphs_need_a_target_region() {
        let Some(ctx) = context().await else { return };
        let dir = tempfile::tempdir().unwrap();
        let settings = ComputePipelineSettings::default();
        assert!(matches!(
            create_normals_graph(ctx, &settings, file_service(dir.path())),
            Err(ComputeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn trajectories_run_after_their_inputs() {
        let Some(ctx) = context().await else { return };
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_inside(Id::new(12, 2200, 2650, Scheme::Tms));
        let graph = create_trajectories_graph(ctx, &settings, file_service(dir.path())).unwrap();
        let order = graph.execution_order();
        let at = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert_eq!(order.len(), 9);
        assert!(at("normals") < at("release_points"));
        assert!(at("release_points") < at("trajectories"));
        assert!(at("trajectories") < at("buffer_to_texture"));
        assert_eq!(order.last(), Some(&"fxaa"));
    }

    #[tokio::test]
    async fn flat_tiles_give_upward_normals() {
        let Some(ctx) = context().await else { return };
        let id = Id::new(3, 4, 5, Scheme::Tms);
        let dir = tempfile::tempdir().unwrap();
        write_flat_tile(dir.path(), id, 1500.0);

        let settings = settings_inside(id);
        let sources = ElevationSources::new(file_service(dir.path()));
        let (mut graph, output) = GraphKind::Normals.create(ctx.clone(), &settings, &sources).unwrap();
        let report = graph.run().await.unwrap();
        assert!(report.skipped.is_empty());

        let Some(Data::Texture(normals)) = graph.output(output.node, output.socket).unwrap() else { panic!("no normals") };
        let texels = normals.read_back(&ctx).await.unwrap();
        let centre = ((128 * 256 + 128) * 4) as usize;
        let n = decode_normal([texels[centre], texels[centre + 1], texels[centre + 2], texels[centre + 3]]);
        assert!(n.z > 0.99, "{n}");
        let Some(Data::Aabb2(region)) = graph.output("stitch", "region aabb").unwrap() else { panic!("no region") };
        assert!(region.contains(srs::tile_bounds(id).centre()));
    }

    #[tokio::test]
    async fn missing_tiles_abort_the_pyramid() {
        let Some(ctx) = context().await else { return };
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_inside(Id::new(6, 33, 40, Scheme::Tms));
        let mut graph = create_tile_pyramid_graph(ctx, &settings, file_service(dir.path())).unwrap();
        let failure = graph.run().await.unwrap_err();
        assert_eq!(failure.node_name, "request_tiles");
        assert!(graph.output("downsample", "tile ids").unwrap().is_none());
    }

    #[tokio::test]
    async fn pyramid_adds_the_parent_level() {
        let Some(ctx) = context().await else { return };
        let id = Id::new(6, 33, 40, Scheme::Tms);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("6").join("33")).unwrap();
        std::fs::write(dir.path().join("6").join("33").join("40.png"), png(256, [90, 120, 60, 255])).unwrap();

        let settings = settings_inside(id);
        let mut graph = create_tile_pyramid_graph(ctx, &settings, file_service(dir.path())).unwrap();
        assert_eq!(graph.execution_order().last(), Some(&"downsample"));
        let report = graph.run().await.unwrap();
        assert_eq!(report.node_durations.len(), 5);

        let Some(Data::TileIds(ids)) = graph.output("downsample", "tile ids").unwrap() else { panic!("no ids") };
        assert_eq!(*ids, vec![Id::new(5, 16, 20, Scheme::Tms), id]);
        let Some(Data::HashMap(map)) = graph.output("downsample", "hash map").unwrap() else { panic!("no map") };
        assert_eq!(map.read().len(), 2);
    }
}
