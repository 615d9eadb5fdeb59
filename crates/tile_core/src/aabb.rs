use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in world metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb2 {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb2 {
    #[inline]
    pub const fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Inverted box; expanding it by anything yields that thing.
    #[inline]
    pub const fn empty() -> Self {
        Self { min: DVec2::splat(f64::MAX), max: DVec2::splat(f64::MIN) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    #[inline]
    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    #[inline]
    pub fn centre(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn expand_by(&mut self, other: &Aabb2) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn expand_by_point(&mut self, p: DVec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Inclusive containment of `other`.
    #[inline]
    pub fn contains_box(&self, other: &Aabb2) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb2) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn with_z(&self, min_z: f64, max_z: f64) -> Aabb3 {
        Aabb3 { min: self.min.extend(min_z), max: self.max.extend(max_z) }
    }
}

/// Axis-aligned box in world metres with altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb3 {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb3 {
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    #[inline]
    pub fn centre(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn xy(&self) -> Aabb2 {
        Aabb2 { min: self.min.truncate(), max: self.max.truncate() }
    }

    /// Distance from `p` to the closest point of the box; zero inside.
    pub fn distance_to(&self, p: DVec3) -> f64 {
        let closest = p.clamp(self.min, self.max);
        (p - closest).length()
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }
}
