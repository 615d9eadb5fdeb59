use std::collections::HashMap;
use tile_core::{srs, Aabb3, Id, Scheme};

/// Lifts flat tile bounds into 3D boxes using known altitude ranges.
///
/// A tile without its own range inherits the nearest ancestor's, falling
/// back to a global default.
#[derive(Debug, Clone)]
pub struct AabbDecorator {
    default_range: (f64, f64),
    ranges: HashMap<Id, (f64, f64)>,
}

impl Default for AabbDecorator {
    fn default() -> Self {
        Self::new((-100.0, 4900.0))
    }
}

impl AabbDecorator {
    pub fn new(default_range: (f64, f64)) -> Self {
        Self { default_range, ranges: HashMap::new() }
    }

    pub fn set_range(&mut self, id: Id, min_alt: f64, max_alt: f64) {
        self.ranges.insert(id.to(Scheme::Tms), (min_alt, max_alt));
    }

    pub fn altitude_range(&self, id: Id) -> (f64, f64) {
        let mut current = Some(id.to(Scheme::Tms));
        while let Some(candidate) = current {
            if let Some(range) = self.ranges.get(&candidate) {
                return *range;
            }
            current = candidate.parent();
        }
        self.default_range
    }

    pub fn aabb(&self, id: Id) -> Aabb3 {
        let (lo, hi) = self.altitude_range(id);
        srs::tile_bounds(id).with_z(lo, hi)
    }
}
