use crate::aabb_decorator::AabbDecorator;
use crate::cache::Cache;
use crate::camera::Definition;
use crate::gpu_array_helper::GpuArrayHelper;
use crate::layer_assembler::LayerAssembler;
use crate::network::Status;
use crate::tile_types::{Layer, LayeredTile, TileLayer};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tile_core::{srs, Id, Scheme};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Upper bound on quads resident on the GPU.
    pub quad_limit: usize,
    /// Assembled tiles kept in RAM.
    pub ram_cache_size: usize,
    pub max_zoom_level: u32,
    /// A tile is refined while its projected edge is longer than this many pixels.
    pub permissible_screen_space_edge_px: f64,
    pub request_timeout: Duration,
    pub unavailable_ttl: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            quad_limit: 512,
            ram_cache_size: 4096,
            max_zoom_level: 18,
            permissible_screen_space_edge_px: 256.0,
            request_timeout: Duration::seconds(30),
            unavailable_ttl: Duration::hours(24),
        }
    }
}

/// A tile the renderer has to upload into `layer_index` of its texture arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuTile {
    pub id: Id,
    pub layer_index: u32,
    pub tile: LayeredTile,
}

/// Delta for the renderer. Deletes are applied before uploads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuQuadsUpdate {
    pub deleted: Vec<Id>,
    pub new_tiles: Vec<GpuTile>,
}

impl GpuQuadsUpdate {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.new_tiles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    GpuQuadsUpdated(GpuQuadsUpdate),
    TileUnavailable(Id),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub n_gpu_quads: usize,
    pub n_gpu_tiles: usize,
    pub n_ram_tiles: usize,
    pub n_in_transit: usize,
    pub n_unavailable: usize,
    pub n_items_in_flight: usize,
}

/// Decides which tiles have to be resident for the current camera, requests
/// missing ones and publishes GPU deltas.
///
/// All entry points take the current time so the executor owns the clock.
/// GPU residency is counted in quads: the four children of a refined tile are
/// uploaded and evicted together.
pub struct Scheduler {
    name: String,
    settings: SchedulerSettings,
    assembler: LayerAssembler,
    aabb_decorator: AabbDecorator,
    ram_cache: Cache<LayeredTile>,
    gpu_quads: Cache<()>,
    gpu_cache: GpuArrayHelper,
    in_transit: HashMap<Id, DateTime<Utc>>,
    unavailable: HashMap<Id, DateTime<Utc>>,
    current_camera: Option<Definition>,
    desired_quads: Vec<Id>,
    desired_set: HashSet<Id>,
    enabled: bool,
    network_reachable: bool,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, assembler: LayerAssembler, settings: SchedulerSettings) -> Self {
        let gpu_cache = GpuArrayHelper::new(settings.quad_limit * 4);
        Self {
            name: name.into(),
            settings,
            assembler,
            aabb_decorator: AabbDecorator::default(),
            ram_cache: Cache::new(),
            gpu_quads: Cache::new(),
            gpu_cache,
            in_transit: HashMap::new(),
            unavailable: HashMap::new(),
            current_camera: None,
            desired_quads: Vec::new(),
            desired_set: HashSet::new(),
            enabled: true,
            network_reachable: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn layers(&self) -> &[Layer] {
        self.assembler.layers()
    }

    pub fn set_aabb_decorator(&mut self, decorator: AabbDecorator) {
        self.aabb_decorator = decorator;
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            n_gpu_quads: self.gpu_quads.len(),
            n_gpu_tiles: self.gpu_cache.n_used(),
            n_ram_tiles: self.ram_cache.len(),
            n_in_transit: self.in_transit.len(),
            n_unavailable: self.unavailable.len(),
            n_items_in_flight: self.assembler.n_items_in_flight(),
        }
    }

    pub fn is_in_transit(&self, id: &Id) -> bool {
        self.in_transit.contains_key(id)
    }

    pub fn is_unavailable(&self, id: &Id, now: DateTime<Utc>) -> bool {
        self.unavailable.get(id).is_some_and(|expiry| *expiry > now)
    }

    pub fn current_camera(&self) -> Option<&Definition> {
        self.current_camera.as_ref()
    }

    /// Quads wanted for the last camera, coarse first.
    pub fn desired_quads(&self) -> &[Id] {
        &self.desired_quads
    }

    pub fn update_camera(&mut self, camera: Definition, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        self.desired_quads = self.compute_desired_quads(&camera);
        self.desired_set = self.desired_quads.iter().copied().collect();
        self.current_camera = Some(camera);
        self.process(now)
    }

    /// Routes one layer delivery through the assembler.
    pub fn deliver(&mut self, layer: Layer, tile: TileLayer, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        match self.assembler.deliver(layer, tile) {
            Some(joined) => self.receive_tile(joined, now),
            None => Vec::new(),
        }
    }

    pub fn receive_tile(&mut self, tile: LayeredTile, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        let id = tile.id;
        if self.in_transit.remove(&id).is_none() {
            tracing::debug!(scheduler = %self.name, tile = %id, "tile arrived after it stopped being tracked");
        }
        let mut events = Vec::new();
        match tile.status() {
            Status::NetworkError => {
                tracing::debug!(scheduler = %self.name, tile = %id, "network error, eligible for retry");
            }
            Status::NotFound => {
                tracing::debug!(scheduler = %self.name, tile = %id, "tile not found on server");
                events.push(self.mark_unavailable(id, now));
            }
            Status::Good => match self.validate(&tile) {
                Ok(()) => {
                    self.ram_cache.insert(id, tile);
                    let evicted = self.ram_cache.purge(self.settings.ram_cache_size);
                    if !evicted.is_empty() {
                        tracing::debug!(scheduler = %self.name, n = evicted.len(), "ram cache purged");
                    }
                    if id.parent().is_some_and(|p| self.desired_set.contains(&p)) {
                        events.extend(self.process(now));
                    }
                }
                Err(layer) => {
                    tracing::warn!(scheduler = %self.name, tile = %id, ?layer, "tile payload is not a recognised image, treating as missing");
                    events.push(self.mark_unavailable(id, now));
                }
            },
        }
        events
    }

    /// Drops requests older than the timeout and expired negative-cache entries.
    /// Timed out ids are eligible for a new request on the next update.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Vec<Id> {
        let timeout = self.settings.request_timeout;
        let expired: Vec<Id> = self
            .in_transit
            .iter()
            .filter(|(_, requested)| now - **requested >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.in_transit.remove(id);
            self.assembler.cancel(id);
            tracing::debug!(scheduler = %self.name, tile = %id, "request timed out");
        }
        self.unavailable.retain(|_, expiry| *expiry > now);
        expired
    }

    pub fn set_network_reachability(&mut self, reachable: bool, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        if reachable == self.network_reachable {
            return Vec::new();
        }
        self.network_reachable = reachable;
        tracing::info!(scheduler = %self.name, reachable, "network reachability changed");
        if !reachable {
            return Vec::new();
        }
        self.unavailable.clear();
        self.process(now)
    }

    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        if enabled == self.enabled {
            return Vec::new();
        }
        self.enabled = enabled;
        if enabled { self.process(now) } else { Vec::new() }
    }

    /// Empties the GPU side and rebuilds it under the new limit. The deletion
    /// is published as its own update ahead of the re-upload.
    pub fn set_quad_limit(&mut self, quad_limit: usize, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        let deleted: Vec<Id> = self.gpu_cache.tiles().copied().collect();
        self.settings.quad_limit = quad_limit;
        self.gpu_quads.clear();
        self.gpu_cache = GpuArrayHelper::new(quad_limit * 4);
        let mut events = Vec::new();
        if !deleted.is_empty() {
            events.push(SchedulerEvent::GpuQuadsUpdated(GpuQuadsUpdate { deleted, new_tiles: Vec::new() }));
        }
        events.extend(self.process(now));
        events
    }

    fn compute_desired_quads(&self, camera: &Definition) -> Vec<Id> {
        let frustum = camera.frustum();
        let mut quads = Vec::new();
        let mut stack = vec![Id::root()];
        while let Some(id) = stack.pop() {
            if id.zoom_level >= self.settings.max_zoom_level {
                continue;
            }
            if id.zoom_level > 0 {
                let aabb = self.aabb_decorator.aabb(id);
                if !frustum.intersects(&aabb) {
                    continue;
                }
                let distance = aabb.distance_to(camera.position());
                let edge_px = camera.to_screen_space(srs::tile_width_m(id.zoom_level), distance);
                if edge_px <= self.settings.permissible_screen_space_edge_px {
                    continue;
                }
            }
            quads.push(id);
            stack.extend(id.children());
        }
        quads.sort();
        quads
    }

    fn process(&mut self, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        if !self.enabled {
            return Vec::new();
        }
        let mut update = GpuQuadsUpdate::default();
        let mut gpu_full = false;
        let desired = self.desired_quads.clone();
        for quad in &desired {
            if self.gpu_quads.touch(quad) {
                continue;
            }
            let children = quad.children();
            let mut ready = true;
            for child in children {
                if self.ram_cache.contains(&child) || self.is_unavailable(&child, now) {
                    continue;
                }
                ready = false;
                self.request(child, now);
            }
            if !ready || gpu_full || !children.iter().any(|c| self.ram_cache.contains(c)) {
                continue;
            }
            if self.gpu_quads.len() >= self.settings.quad_limit && !self.evict_quad(&mut update) {
                tracing::debug!(scheduler = %self.name, quad = %quad, "quad limit reached, skipping uploads");
                gpu_full = true;
                continue;
            }
            self.upload_quad(*quad, &mut update);
        }
        if update.is_empty() {
            return Vec::new();
        }
        tracing::debug!(
            scheduler = %self.name,
            deleted = update.deleted.len(),
            new_tiles = update.new_tiles.len(),
            "gpu quads updated"
        );
        vec![SchedulerEvent::GpuQuadsUpdated(update)]
    }

    fn request(&mut self, id: Id, now: DateTime<Utc>) {
        if !self.network_reachable || self.in_transit.contains_key(&id) {
            return;
        }
        self.in_transit.insert(id, now);
        self.assembler.load(id);
    }

    /// Evicts the least recently used quad that is no longer desired.
    fn evict_quad(&mut self, update: &mut GpuQuadsUpdate) -> bool {
        let victim = self.gpu_quads.lru_order().find(|q| !self.desired_set.contains(*q)).copied();
        let Some(victim) = victim else {
            return false;
        };
        self.gpu_quads.remove(&victim);
        for child in victim.children() {
            if self.gpu_cache.remove_tile(&child).is_some() {
                update.deleted.push(child);
            }
        }
        true
    }

    fn upload_quad(&mut self, quad: Id, update: &mut GpuQuadsUpdate) {
        self.gpu_quads.insert(quad, ());
        for child in quad.children() {
            let Some(tile) = self.ram_cache.get(&child).cloned() else {
                continue;
            };
            let mut evicted = Vec::new();
            let Some(layer_index) = self.gpu_cache.add_tile(child, |e| evicted.push(e)) else {
                continue;
            };
            for e in evicted {
                match update.new_tiles.iter().position(|t| t.id == e) {
                    Some(pos) => {
                        update.new_tiles.remove(pos);
                    }
                    None => update.deleted.push(e),
                }
            }
            update.new_tiles.push(GpuTile { id: child, layer_index, tile });
        }
    }

    fn mark_unavailable(&mut self, id: Id, now: DateTime<Utc>) -> SchedulerEvent {
        self.unavailable.insert(id, now + self.settings.unavailable_ttl);
        SchedulerEvent::TileUnavailable(id)
    }

    /// Sniffs the magic bytes of every configured image layer.
    fn validate(&self, tile: &LayeredTile) -> Result<(), Layer> {
        use image::ImageFormat;
        for layer in self.assembler.layers() {
            let (data, accepted): (&[u8], &[ImageFormat]) = match layer {
                Layer::Height => (&tile.height[..], &[ImageFormat::Png][..]),
                Layer::Ortho => (&tile.ortho[..], &[ImageFormat::Jpeg, ImageFormat::Png][..]),
                Layer::Vector => continue,
            };
            match image::guess_format(data) {
                Ok(format) if accepted.contains(&format) => {}
                _ => return Err(*layer),
            }
        }
        Ok(())
    }
}

/// Tiles covering the world-space `aabb` at `zoom_level`, in the requested scheme.
pub fn tiles_in_region(aabb: &tile_core::Aabb2, zoom_level: u32, scheme: Scheme) -> Vec<Id> {
    if aabb.is_empty() {
        return Vec::new();
    }
    let lo = srs::world_xy_to_tile_id(aabb.min, zoom_level);
    let hi = srs::world_xy_to_tile_id(aabb.max, zoom_level);
    let mut ids = Vec::new();
    for x in lo.coords.x..=hi.coords.x {
        for y in lo.coords.y..=hi.coords.y {
            ids.push(Id::new(zoom_level, x, y, Scheme::Tms).to(scheme));
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer_assembler::tests::RecordingLoader;
    use bytes::Bytes;
    use glam::{DVec2, DVec3, UVec2};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF";

    fn scheduler(quad_limit: usize) -> (Scheduler, RecordingLoader) {
        let loader = RecordingLoader::default();
        let assembler = LayerAssembler::new(vec![Layer::Ortho, Layer::Height], Box::new(loader.clone()));
        let settings = SchedulerSettings { quad_limit, max_zoom_level: 6, ..Default::default() };
        (Scheduler::new("test", assembler, settings), loader)
    }

    fn camera_at(lat: f64, lon: f64) -> Definition {
        let target = srs::lat_long_to_world(DVec2::new(lat, lon)).extend(0.0);
        Definition::look_at(target + DVec3::new(0.0, -200_000.0, 150_000.0), target, UVec2::new(640, 480))
    }

    fn body(layer: Layer) -> Bytes {
        match layer {
            Layer::Height => Bytes::from_static(PNG),
            _ => Bytes::from_static(JPEG),
        }
    }

    fn take_calls(loader: &RecordingLoader) -> Vec<(Layer, Id)> {
        loader.calls.lock().drain(..).collect()
    }

    fn serve_all(s: &mut Scheduler, loader: &RecordingLoader, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        loop {
            let calls = take_calls(loader);
            if calls.is_empty() {
                return events;
            }
            for (layer, id) in calls {
                events.extend(s.deliver(layer, TileLayer::new(id, Status::Good, body(layer)), now));
            }
        }
    }

    fn updates(events: &[SchedulerEvent]) -> Vec<&GpuQuadsUpdate> {
        events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::GpuQuadsUpdated(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn desired_quads_start_at_root_and_respect_max_zoom() {
        let (mut s, _) = scheduler(64);
        s.update_camera(camera_at(47.0, 13.0), Utc::now());
        let quads = s.desired_quads();
        assert_eq!(quads.first(), Some(&Id::root()));
        assert!(quads.iter().all(|q| q.zoom_level < 6));
        assert!(quads.iter().any(|q| q.zoom_level == 5));
        assert!(quads.windows(2).all(|w| w[0].zoom_level <= w[1].zoom_level));
    }

    #[test]
    fn repeated_camera_does_no_work() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        let camera = camera_at(47.0, 13.0);

        assert!(s.update_camera(camera.clone(), now).is_empty());
        let first = take_calls(&loader);
        assert!(!first.is_empty());
        assert!(s.update_camera(camera.clone(), now).is_empty());
        assert!(take_calls(&loader).is_empty());

        for (layer, id) in first {
            s.deliver(layer, TileLayer::new(id, Status::Good, body(layer)), now);
        }
        assert!(serve_all(&mut s, &loader, now).is_empty());
        assert!(s.statistics().n_gpu_tiles > 0);
        assert!(s.update_camera(camera, now).is_empty());
        assert!(take_calls(&loader).is_empty());
    }

    #[test]
    fn deltas_are_disjoint_and_bounded_by_quad_limit() {
        let (mut s, loader) = scheduler(3);
        let now = Utc::now();
        let mut uploaded: HashSet<Id> = HashSet::new();
        let mut saw_delete = false;

        for (lat, lon) in [(47.0, 13.0), (-33.0, 151.0), (47.0, 13.0)] {
            let mut events = s.update_camera(camera_at(lat, lon), now);
            events.extend(serve_all(&mut s, &loader, now));
            for update in updates(&events) {
                let new: HashSet<Id> = update.new_tiles.iter().map(|t| t.id).collect();
                assert!(update.deleted.iter().all(|d| !new.contains(d)));
                for d in &update.deleted {
                    assert!(uploaded.remove(d), "deleted {d} was never uploaded");
                    saw_delete = true;
                }
                uploaded.extend(new);
            }
            let stats = s.statistics();
            assert!(stats.n_gpu_quads <= 3);
            assert!(stats.n_gpu_tiles <= 12);
            assert_eq!(stats.n_gpu_tiles, uploaded.len());
        }
        assert!(saw_delete);
    }

    #[test]
    fn not_found_is_sticky_until_ttl_or_reachability() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        let camera = camera_at(47.0, 13.0);
        s.update_camera(camera.clone(), now);
        let calls = take_calls(&loader);
        let missing = calls[0].1;

        let mut events = s.deliver(Layer::Ortho, TileLayer::new(missing, Status::Good, body(Layer::Ortho)), now);
        events.extend(s.deliver(Layer::Height, TileLayer::new(missing, Status::NotFound, Bytes::new()), now));
        assert_eq!(events, vec![SchedulerEvent::TileUnavailable(missing)]);
        assert!(!s.is_in_transit(&missing));

        let later = now + Duration::minutes(1);
        s.update_camera(camera.clone(), later);
        assert!(!take_calls(&loader).iter().any(|(_, id)| *id == missing));

        let much_later = now + Duration::hours(25);
        s.update_camera(camera.clone(), much_later);
        assert!(take_calls(&loader).iter().any(|(_, id)| *id == missing));

        let (mut s, loader) = scheduler(64);
        s.update_camera(camera, now);
        let missing = take_calls(&loader)[0].1;
        s.deliver(Layer::Ortho, TileLayer::new(missing, Status::NotFound, Bytes::new()), now);
        s.deliver(Layer::Height, TileLayer::new(missing, Status::NotFound, Bytes::new()), now);
        s.set_network_reachability(false, now);
        s.set_network_reachability(true, now);
        assert_eq!(s.statistics().n_unavailable, 0);
        assert!(take_calls(&loader).iter().any(|(_, id)| *id == missing));
    }

    #[test]
    fn network_errors_are_not_cached() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        let camera = camera_at(47.0, 13.0);
        s.update_camera(camera.clone(), now);
        let id = take_calls(&loader)[0].1;
        s.deliver(Layer::Ortho, TileLayer::new(id, Status::NetworkError, Bytes::new()), now);
        let events = s.deliver(Layer::Height, TileLayer::new(id, Status::Good, body(Layer::Height)), now);
        assert!(events.is_empty());
        assert!(!s.is_unavailable(&id, now));

        s.update_camera(camera, now);
        let again = take_calls(&loader);
        assert!(again.contains(&(Layer::Ortho, id)) && again.contains(&(Layer::Height, id)));
    }

    #[test]
    fn timeouts_release_in_transit() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        let camera = camera_at(47.0, 13.0);
        s.update_camera(camera.clone(), now);
        let n = s.statistics().n_in_transit;
        assert!(n > 0);
        take_calls(&loader);

        assert!(s.check_timeouts(now + Duration::seconds(29)).is_empty());
        assert_eq!(s.check_timeouts(now + Duration::seconds(30)).len(), n);
        let stats = s.statistics();
        assert_eq!(stats.n_in_transit, 0);
        assert_eq!(stats.n_items_in_flight, 0);

        s.update_camera(camera, now + Duration::seconds(31));
        assert_eq!(take_calls(&loader).len(), 2 * n);
    }

    #[test]
    fn undecodable_payload_counts_as_missing() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        s.update_camera(camera_at(47.0, 13.0), now);
        let id = take_calls(&loader)[0].1;
        s.deliver(Layer::Ortho, TileLayer::new(id, Status::Good, body(Layer::Ortho)), now);
        let events = s.deliver(Layer::Height, TileLayer::new(id, Status::Good, Bytes::from_static(b"<html>")), now);
        assert_eq!(events, vec![SchedulerEvent::TileUnavailable(id)]);
        assert_eq!(s.statistics().n_ram_tiles, 0);
    }

    #[test]
    fn unreachable_network_pauses_requests() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        s.set_network_reachability(false, now);
        s.update_camera(camera_at(47.0, 13.0), now);
        assert!(take_calls(&loader).is_empty());
        s.set_network_reachability(true, now);
        assert!(!take_calls(&loader).is_empty());
    }

    #[test]
    fn disabled_scheduler_is_silent() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        s.set_enabled(false, now);
        s.update_camera(camera_at(47.0, 13.0), now);
        assert!(take_calls(&loader).is_empty());
        s.set_enabled(true, now);
        assert!(!take_calls(&loader).is_empty());
    }

    #[test]
    fn lowering_quad_limit_republishes() {
        let (mut s, loader) = scheduler(64);
        let now = Utc::now();
        s.update_camera(camera_at(47.0, 13.0), now);
        serve_all(&mut s, &loader, now);
        let before = s.statistics().n_gpu_tiles;
        assert!(before > 4);

        let events = s.set_quad_limit(1, now);
        let ups = updates(&events);
        assert_eq!(ups[0].deleted.len(), before);
        assert!(ups[0].new_tiles.is_empty());
        assert!(ups[1].new_tiles.len() <= 4);
        assert_eq!(s.statistics().n_gpu_quads, 1);
    }

    #[test]
    fn region_tiles_cover_box() {
        let a = srs::tile_bounds(Id::new(4, 3, 5, Scheme::Tms));
        let b = srs::tile_bounds(Id::new(4, 4, 6, Scheme::Tms));
        let mut region = a;
        region.expand_by(&b);
        let shrink = DVec2::splat(1.0);
        let region = tile_core::Aabb2::new(region.min + shrink, region.max - shrink);
        let ids = tiles_in_region(&region, 4, Scheme::Tms);
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&Id::new(4, 3, 5, Scheme::Tms)));
        assert!(tiles_in_region(&tile_core::Aabb2::empty(), 4, Scheme::Tms).is_empty());
    }
}
