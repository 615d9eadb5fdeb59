use glam::{DMat4, DVec3, DVec4, UVec2};
use tile_core::Aabb3;

/// A view of the world: position and orientation in EPSG:3857 metres with
/// altitude as z, plus a perspective projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    position: DVec3,
    view: DMat4,
    fov_y_deg: f64,
    viewport: UVec2,
    near: f64,
    far: f64,
}

impl Definition {
    pub fn look_at(position: DVec3, target: DVec3, viewport: UVec2) -> Self {
        let forward = (target - position).normalize_or_zero();
        // looking straight down needs a different up hint
        let up = if forward.cross(DVec3::Z).length_squared() < 1e-12 { DVec3::Y } else { DVec3::Z };
        Self {
            position,
            view: DMat4::look_at_rh(position, target, up),
            fov_y_deg: 60.0,
            viewport,
            near: 1.0,
            far: 1.0e8,
        }
    }

    pub fn with_field_of_view(mut self, fov_y_deg: f64) -> Self {
        self.fov_y_deg = fov_y_deg.clamp(1.0, 170.0);
        self
    }

    pub fn set_viewport_size(&mut self, viewport: UVec2) {
        self.viewport = viewport.max(UVec2::ONE);
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.position
    }

    #[inline]
    pub fn viewport_size(&self) -> UVec2 {
        self.viewport
    }

    pub fn projection_matrix(&self) -> DMat4 {
        let aspect = f64::from(self.viewport.x.max(1)) / f64::from(self.viewport.y.max(1));
        DMat4::perspective_rh(self.fov_y_deg.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> DMat4 {
        self.projection_matrix() * self.view
    }

    /// Focal length in pixels along the vertical axis.
    fn focal_px(&self) -> f64 {
        f64::from(self.viewport.y) * 0.5 / (self.fov_y_deg.to_radians() * 0.5).tan()
    }

    /// Projected size in pixels of a world length seen at `distance`.
    pub fn to_screen_space(&self, world_length: f64, distance: f64) -> f64 {
        if distance <= f64::EPSILON {
            return f64::INFINITY;
        }
        world_length / distance * self.focal_px()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }
}

/// Six inward-facing planes `(n, d)`; a point is inside when `n·p + d >= 0`.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extracts planes from a clip matrix with a [0, 1] depth range.
    pub fn from_view_projection(m: &DMat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let normalise = |p: DVec4| {
            let len = p.truncate().length();
            if len > 0.0 { p / len } else { p }
        };
        Self {
            planes: [
                normalise(r3 + r0),
                normalise(r3 - r0),
                normalise(r3 + r1),
                normalise(r3 - r1),
                normalise(r2),
                normalise(r3 - r2),
            ],
        }
    }

    /// Conservative box test: false only if the box is fully outside one plane.
    pub fn intersects(&self, aabb: &Aabb3) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.truncate();
            let p = DVec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            n.dot(p) + plane.w >= 0.0
        })
    }
}
