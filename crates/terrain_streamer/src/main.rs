mod config;
mod flight;
mod metrics;

use crate::config::Config;
use crate::flight::Orbit;
use crate::metrics::StreamerMetrics;
use anyhow::Context;
use clap::Parser;
use compute_engine::{ComputePipelineSettings, ElevationSources, GpuContext, GraphKind};
use glam::DVec2;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tile_core::Aabb2;
use tile_scheduler::director::DirectorEvent;
use tile_scheduler::reachability::ReachabilityMonitor;
use tile_scheduler::service::{self, SchedulerSource, ServiceSettings};
use tile_scheduler::{Layer, SchedulerEvent, SchedulerSettings, TileLoadService};
use tracing_subscriber::{fmt, EnvFilter};

const CAMERA_TICK: Duration = Duration::from_millis(100);
const STATISTICS_INTERVAL: Duration = Duration::from_secs(5);

fn load_service(config: &Config, url: &str, pattern: &str, file_ending: &str) -> anyhow::Result<TileLoadService> {
    let service = TileLoadService::new(url, pattern.parse()?, file_ending)
        .with_context(|| format!("tile source {url}"))?
        .with_load_balancing_targets(config.load_balancing_targets.clone())?;
    Ok(service)
}

fn scheduler_sources(config: &Config) -> anyhow::Result<Vec<SchedulerSource>> {
    let height = load_service(config, &config.height_url, &config.height_url_pattern, &config.height_file_ending)?;
    let ortho = load_service(config, &config.ortho_url, &config.ortho_url_pattern, &config.ortho_file_ending)?;
    let mut ortho_services = vec![(Layer::Ortho, ortho)];
    if let Some(url) = &config.vector_url {
        ortho_services.push((
            Layer::Vector,
            load_service(config, url, &config.vector_url_pattern, &config.vector_file_ending)?,
        ));
    }
    Ok(vec![
        SchedulerSource { name: "geometry".into(), services: vec![(Layer::Height, height)] },
        SchedulerSource { name: "ortho".into(), services: ortho_services },
    ])
}

fn elevation_sources(config: &Config) -> anyhow::Result<ElevationSources> {
    let dtm = load_service(config, &config.height_url, &config.height_url_pattern, &config.height_file_ending)?;
    let mut sources = ElevationSources::new(dtm);
    if let Some(url) = &config.dsm_url {
        sources = sources.with_dsm(load_service(config, url, &config.dsm_url_pattern, &config.dsm_file_ending)?);
    }
    Ok(sources)
}

/// Builds and runs one compute graph over the region below the orbit centre.
async fn run_compute_graph(config: &Config, kind: GraphKind, centre: DVec2, metrics: &StreamerMetrics) -> anyhow::Result<()> {
    let mut settings = match &config.pipeline_settings {
        Some(path) => ComputePipelineSettings::read_from_file(path)
            .with_context(|| format!("reading pipeline settings {}", path.display()))?,
        None => ComputePipelineSettings::default(),
    };
    if settings.target_region.is_none() && settings.region_aabb_file.is_none() {
        let half = DVec2::splat(config.compute_region_half_edge_m);
        settings.target_region = Some(Aabb2::new(centre - half, centre + half));
    }
    let sources = elevation_sources(config)?;

    let ctx = GpuContext::new_headless().await.context("opening GPU device")?;
    let (mut graph, output) = kind.create(ctx, &settings, &sources)?;
    tracing::info!(graph = ?kind, nodes = ?graph.execution_order(), "compute graph assembled");

    metrics.graph_runs_total.inc();
    let started = Instant::now();
    match graph.run().await {
        Ok(report) => {
            metrics.graph_run_seconds.observe(started.elapsed().as_secs_f64());
            let produced = graph.output(output.node, output.socket)?.is_some();
            tracing::info!(
                graph = ?kind,
                total = ?report.total,
                skipped = ?report.skipped,
                produced,
                "compute graph finished"
            );
            Ok(())
        }
        Err(failure) => {
            metrics.graph_failures_total.inc();
            Err(failure.into())
        }
    }
}

fn record_event(metrics: &StreamerMetrics, event: &DirectorEvent) {
    let scheduler = event.scheduler.as_str();
    match &event.event {
        SchedulerEvent::GpuQuadsUpdated(update) => {
            metrics.tiles_received_total.with_label_values(&[scheduler]).inc_by(update.new_tiles.len() as u64);
            metrics.tiles_deleted_total.with_label_values(&[scheduler]).inc_by(update.deleted.len() as u64);
            tracing::debug!(
                scheduler,
                new = update.new_tiles.len(),
                deleted = update.deleted.len(),
                "gpu quads updated"
            );
        }
        SchedulerEvent::TileUnavailable(id) => {
            metrics.tiles_unavailable_total.with_label_values(&[scheduler]).inc();
            tracing::debug!(scheduler, tile = %id, "tile unavailable");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    fmt().with_env_filter(EnvFilter::from_default_env()).json().init();
    let config = Arc::new(Config::parse());
    tracing::info!(config = ?config, "Terrain streamer starting with configuration");

    let metrics = Arc::new(StreamerMetrics::new().context("registering metrics")?);
    let orbit = Orbit::new(
        config.camera_lat,
        config.camera_lon,
        config.camera_alt,
        config.orbit_radius_m,
        Duration::from_secs_f64(config.orbit_period_s.max(0.0)),
    );
    let compute_graph = config.compute_graph.as_deref().map(str::parse::<GraphKind>).transpose()?;

    // --- 2. Start Metrics Server ---
    let metrics_router = metrics.router();
    let metrics_addr: std::net::SocketAddr = config.metrics_listen_addr.parse().context("metrics listen address")?;
    let listener = tokio::net::TcpListener::bind(metrics_addr).await.context("binding metrics listener")?;
    tokio::spawn(async move {
        tracing::info!(addr = %metrics_addr, "Metrics server started");
        if let Err(e) = axum::serve(listener, metrics_router.into_make_service()).await {
            tracing::error!(error = %e, "Metrics server exited");
        }
    });

    // --- 3. Scheduler Service ---
    let settings = ServiceSettings {
        update_rate_hz: config.update_rate_hz,
        scheduler: SchedulerSettings {
            quad_limit: config.quad_limit,
            ram_cache_size: config.ram_cache_size,
            ..Default::default()
        },
        ..Default::default()
    };
    let (scheduler, mut events) = service::spawn(scheduler_sources(&config)?, settings)?;
    if let Some(url) = &config.reachability_url {
        let monitor = ReachabilityMonitor::new(url.clone(), Duration::from_secs(config.reachability_interval_s.max(1)))?;
        monitor.spawn(scheduler.commands());
    }

    // --- 4. Optional Compute Graph ---
    if let Some(kind) = compute_graph {
        let (config, metrics, centre) = (config.clone(), metrics.clone(), orbit.centre());
        tokio::spawn(async move {
            if let Err(e) = run_compute_graph(&config, kind, centre, &metrics).await {
                tracing::error!(graph = ?kind, error = %e, "compute graph failed");
            }
        });
    }

    // --- 5. Main Camera Loop ---
    let started = Instant::now();
    let mut camera_tick = tokio::time::interval(CAMERA_TICK);
    let mut statistics_tick = tokio::time::interval(STATISTICS_INTERVAL);

    tracing::info!("Starting camera loop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received.");
                break;
            },
            event = events.recv() => match event {
                Some(event) => record_event(&metrics, &event),
                None => {
                    tracing::warn!("Scheduler service stopped.");
                    break;
                }
            },
            _ = camera_tick.tick() => {
                if let Err(e) = scheduler.update_camera(orbit.camera_at(started.elapsed())).await {
                    tracing::warn!(error = %e, "Camera update rejected");
                    break;
                }
            },
            _ = statistics_tick.tick() => {
                let statistics = scheduler.statistics();
                metrics.update_statistics(&statistics);
                tracing::info!(statistics = ?statistics, "Scheduler statistics");
            }
        }
    }

    scheduler.shutdown().await?;
    tracing::info!("Terrain streamer shutting down.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute_engine::TileSource;

    fn config(extra: &[&str]) -> Config {
        let mut args = vec!["terrain_streamer", "--height-url", "file:///srv/dtm/", "--ortho-url", "file:///srv/ortho/"];
        args.extend_from_slice(extra);
        Config::parse_from(args)
    }

    #[test]
    fn dsm_setting_uses_the_dsm_server() {
        let sources = elevation_sources(&config(&["--dsm-url", "file:///srv/dsm/"])).unwrap();
        assert_eq!(sources.service(TileSource::Dtm).unwrap().base_url(), "file:///srv/dtm/");
        assert_eq!(sources.service(TileSource::Dsm).unwrap().base_url(), "file:///srv/dsm/");
    }

    #[test]
    fn dsm_without_a_server_is_rejected() {
        let sources = elevation_sources(&config(&[])).unwrap();
        assert!(sources.service(TileSource::Dsm).is_err());
    }
}
