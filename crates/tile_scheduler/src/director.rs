use crate::camera::Definition;
use crate::error::SchedulerError;
use crate::scheduler::{Scheduler, SchedulerEvent, Statistics};
use crate::tile_types::{Layer, TileLayer};
use chrono::{DateTime, Utc};
use tile_core::Id;

/// Event of one scheduler, tagged with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorEvent {
    pub scheduler: String,
    pub event: SchedulerEvent,
}

/// Composes several schedulers (typically `geometry` and `ortho`) and feeds
/// them the same inputs. Events come out in registration order.
#[derive(Default)]
pub struct Director {
    schedulers: Vec<Scheduler>,
}

impl Director {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scheduler: Scheduler) -> Result<(), SchedulerError> {
        if self.get(scheduler.name()).is_some() {
            return Err(SchedulerError::DuplicateScheduler(scheduler.name().to_owned()));
        }
        tracing::info!(scheduler = scheduler.name(), layers = ?scheduler.layers(), "scheduler registered");
        self.schedulers.push(scheduler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Scheduler> {
        self.schedulers.iter().find(|s| s.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Scheduler> {
        self.schedulers.iter_mut().find(|s| s.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schedulers.iter().map(|s| s.name())
    }

    fn each(&mut self, mut f: impl FnMut(&mut Scheduler) -> Vec<SchedulerEvent>) -> Vec<DirectorEvent> {
        let mut out = Vec::new();
        for scheduler in &mut self.schedulers {
            let events = f(scheduler);
            out.extend(events.into_iter().map(|event| DirectorEvent { scheduler: scheduler.name().to_owned(), event }));
        }
        out
    }

    pub fn update_camera(&mut self, camera: &Definition, now: DateTime<Utc>) -> Vec<DirectorEvent> {
        self.each(|s| s.update_camera(camera.clone(), now))
    }

    /// Routes a layer delivery to the scheduler it was requested by.
    /// Deliveries for unknown schedulers are dropped.
    pub fn deliver(&mut self, scheduler: &str, layer: Layer, tile: TileLayer, now: DateTime<Utc>) -> Vec<DirectorEvent> {
        let Some(target) = self.get_mut(scheduler) else {
            tracing::warn!(scheduler, tile = %tile.id, "delivery for unknown scheduler dropped");
            return Vec::new();
        };
        target
            .deliver(layer, tile, now)
            .into_iter()
            .map(|event| DirectorEvent { scheduler: scheduler.to_owned(), event })
            .collect()
    }

    pub fn set_network_reachability(&mut self, reachable: bool, now: DateTime<Utc>) -> Vec<DirectorEvent> {
        self.each(|s| s.set_network_reachability(reachable, now))
    }

    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Vec<DirectorEvent> {
        self.each(|s| s.set_enabled(enabled, now))
    }

    pub fn set_quad_limit(&mut self, quad_limit: usize, now: DateTime<Utc>) -> Vec<DirectorEvent> {
        self.each(|s| s.set_quad_limit(quad_limit, now))
    }

    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Vec<(String, Id)> {
        let mut out = Vec::new();
        for scheduler in &mut self.schedulers {
            let name = scheduler.name().to_owned();
            out.extend(scheduler.check_timeouts(now).into_iter().map(|id| (name.clone(), id)));
        }
        out
    }

    pub fn statistics(&self) -> Vec<(String, Statistics)> {
        self.schedulers.iter().map(|s| (s.name().to_owned(), s.statistics())).collect()
    }
}
