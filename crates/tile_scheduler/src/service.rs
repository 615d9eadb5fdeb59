//! The scheduler executor: a single tokio task owning the [`Director`] and
//! every scheduler in it. Network loads run as spawned tasks and post their
//! results back through a channel, so scheduler state is never shared.

use crate::camera::Definition;
use crate::director::{Director, DirectorEvent};
use crate::error::SchedulerError;
use crate::layer_assembler::{LayerAssembler, LayerLoader};
use crate::load_service::TileLoadService;
use crate::scheduler::{Scheduler, SchedulerSettings, Statistics};
use crate::tile_types::{Layer, TileLayer};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tile_core::Id;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    UpdateCamera(Definition),
    SetNetworkReachability(bool),
    SetQuadLimit(usize),
    SetEnabled(bool),
    Shutdown,
}

#[derive(Debug)]
struct Delivery {
    scheduler: String,
    layer: Layer,
    tile: TileLayer,
}

/// Starts one tokio task per requested layer and posts the result back to the
/// executor.
pub struct SpawningLoader {
    scheduler: String,
    sources: [Option<Arc<TileLoadService>>; 3],
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl LayerLoader for SpawningLoader {
    fn load(&self, layer: Layer, id: Id) {
        let Some(service) = self.sources[layer.index()].clone() else {
            tracing::error!(scheduler = %self.scheduler, ?layer, "no source for requested layer");
            return;
        };
        let scheduler = self.scheduler.clone();
        let deliveries = self.deliveries.clone();
        tokio::spawn(async move {
            let tile = service.load(id).await;
            // the executor may already be gone during shutdown
            let _ = deliveries.send(Delivery { scheduler, layer, tile });
        });
    }
}

/// One scheduler and the servers backing its layers.
#[derive(Debug, Clone)]
pub struct SchedulerSource {
    pub name: String,
    pub services: Vec<(Layer, TileLoadService)>,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Camera updates are coalesced to at most this rate.
    pub update_rate_hz: f64,
    pub timeout_sweep_interval: Duration,
    pub scheduler: SchedulerSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            update_rate_hz: 5.0,
            timeout_sweep_interval: Duration::from_secs(1),
            scheduler: SchedulerSettings::default(),
        }
    }
}

pub struct ServiceHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    statistics: watch::Receiver<Vec<(String, Statistics)>>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    pub async fn send(&self, command: SchedulerCommand) -> Result<(), SchedulerError> {
        self.commands.send(command).await.map_err(|_| SchedulerError::ServiceClosed)
    }

    pub async fn update_camera(&self, camera: Definition) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::UpdateCamera(camera)).await
    }

    /// Sender for other producers such as the reachability monitor.
    pub fn commands(&self) -> mpsc::Sender<SchedulerCommand> {
        self.commands.clone()
    }

    /// Latest per-scheduler statistics, refreshed after every executor step.
    pub fn statistics(&self) -> Vec<(String, Statistics)> {
        self.statistics.borrow().clone()
    }

    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        // the task may have stopped on its own when the event receiver was dropped
        let _ = self.commands.send(SchedulerCommand::Shutdown).await;
        self.task.await.map_err(|_| SchedulerError::ServiceClosed)
    }
}

fn build_director(
    sources: Vec<SchedulerSource>,
    settings: &SchedulerSettings,
    deliveries: &mpsc::UnboundedSender<Delivery>,
) -> Result<Director, SchedulerError> {
    let mut director = Director::new();
    for source in sources {
        let mut slots: [Option<Arc<TileLoadService>>; 3] = Default::default();
        let mut layers = Vec::with_capacity(source.services.len());
        for (layer, service) in source.services {
            slots[layer.index()] = Some(Arc::new(service));
            layers.push(layer);
        }
        if layers.is_empty() {
            return Err(SchedulerError::MissingLayerSource(Layer::Height));
        }
        let loader = SpawningLoader { scheduler: source.name.clone(), sources: slots, deliveries: deliveries.clone() };
        let assembler = LayerAssembler::new(layers, Box::new(loader));
        director.add(Scheduler::new(source.name, assembler, settings.clone()))?;
    }
    Ok(director)
}

/// Spawns the executor. Events arrive on the returned receiver in emission
/// order; dropping it stops the executor.
pub fn spawn(
    sources: Vec<SchedulerSource>,
    settings: ServiceSettings,
) -> Result<(ServiceHandle, mpsc::UnboundedReceiver<DirectorEvent>), SchedulerError> {
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
    let director = build_director(sources, &settings.scheduler, &delivery_tx)?;
    drop(delivery_tx);

    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (stats_tx, stats_rx) = watch::channel(director.statistics());

    let task = tokio::spawn(run(director, settings, command_rx, delivery_rx, event_tx, stats_tx));
    Ok((ServiceHandle { commands: command_tx, statistics: stats_rx, task }, event_rx))
}

async fn run(
    mut director: Director,
    settings: ServiceSettings,
    mut commands: mpsc::Receiver<SchedulerCommand>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
    events: mpsc::UnboundedSender<DirectorEvent>,
    statistics: watch::Sender<Vec<(String, Statistics)>>,
) {
    let period = Duration::from_secs_f64(1.0 / settings.update_rate_hz.max(0.1));
    let mut debounce = tokio::time::interval(period);
    debounce.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sweep = tokio::time::interval(settings.timeout_sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pending_camera: Option<Definition> = None;

    tracing::info!(schedulers = ?director.names().collect::<Vec<_>>(), "scheduler service started");
    loop {
        let emitted = tokio::select! {
            command = commands.recv() => match command {
                None | Some(SchedulerCommand::Shutdown) => break,
                Some(SchedulerCommand::UpdateCamera(camera)) => {
                    pending_camera = Some(camera);
                    Vec::new()
                }
                Some(SchedulerCommand::SetNetworkReachability(reachable)) => {
                    director.set_network_reachability(reachable, Utc::now())
                }
                Some(SchedulerCommand::SetQuadLimit(limit)) => director.set_quad_limit(limit, Utc::now()),
                Some(SchedulerCommand::SetEnabled(enabled)) => director.set_enabled(enabled, Utc::now()),
            },
            Some(delivery) = deliveries.recv() => {
                director.deliver(&delivery.scheduler, delivery.layer, delivery.tile, Utc::now())
            }
            _ = debounce.tick() => match pending_camera.take() {
                Some(camera) => director.update_camera(&camera, Utc::now()),
                None => Vec::new(),
            },
            _ = sweep.tick() => {
                let expired = director.check_timeouts(Utc::now());
                if !expired.is_empty() {
                    tracing::debug!(n = expired.len(), "tile requests timed out");
                }
                Vec::new()
            }
        };
        for event in emitted {
            if events.send(event).is_err() {
                tracing::info!("event receiver dropped, stopping scheduler service");
                return;
            }
        }
        statistics.send_replace(director.statistics());
    }
    tracing::info!("scheduler service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_service::UrlPattern;
    use crate::scheduler::SchedulerEvent;
    use glam::{DVec3, UVec2};

    fn camera() -> Definition {
        Definition::look_at(DVec3::new(0.0, -5.0e6, 5.0e6), DVec3::ZERO, UVec2::new(800, 600))
    }

    fn geometry_source(dir: &std::path::Path) -> SchedulerSource {
        let base = format!("file://{}/", dir.display());
        SchedulerSource {
            name: "geometry".into(),
            services: vec![(Layer::Height, TileLoadService::new(base, UrlPattern::Zxy, ".png").unwrap())],
        }
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            update_rate_hz: 50.0,
            scheduler: SchedulerSettings { max_zoom_level: 2, ..Default::default() },
            ..Default::default()
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<DirectorEvent>) -> DirectorEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn missing_files_are_reported_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events) = spawn(vec![geometry_source(dir.path())], settings()).unwrap();
        handle.update_camera(camera()).await.unwrap();

        let event = next_event(&mut events).await;
        assert_eq!(event.scheduler, "geometry");
        assert!(matches!(event.event, SchedulerEvent::TileUnavailable(_)));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn present_files_reach_the_gpu() {
        let dir = tempfile::tempdir().unwrap();
        for z in 1..=2u32 {
            for x in 0..(1u32 << z) {
                let column = dir.path().join(format!("{z}/{x}"));
                std::fs::create_dir_all(&column).unwrap();
                for y in 0..(1u32 << z) {
                    std::fs::write(column.join(format!("{y}.png")), b"\x89PNG\r\n\x1a\n0000").unwrap();
                }
            }
        }
        let (handle, mut events) = spawn(vec![geometry_source(dir.path())], settings()).unwrap();
        handle.update_camera(camera()).await.unwrap();

        let event = next_event(&mut events).await;
        let SchedulerEvent::GpuQuadsUpdated(update) = event.event else {
            panic!("expected a gpu update, got {event:?}");
        };
        assert!(update.deleted.is_empty());
        assert_eq!(update.new_tiles.len(), 4);
        let parent = update.new_tiles[0].id.parent();
        assert!(update.new_tiles.iter().all(|t| t.id.parent() == parent));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn sources_without_layers_are_rejected() {
        let source = SchedulerSource { name: "empty".into(), services: Vec::new() };
        assert!(matches!(spawn(vec![source], settings()), Err(SchedulerError::MissingLayerSource(_))));
    }
}
