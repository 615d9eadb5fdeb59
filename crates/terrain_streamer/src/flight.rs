use glam::{DVec2, UVec2};
use std::time::Duration;
use tile_core::srs;
use tile_scheduler::camera::Definition;

const VIEWPORT: UVec2 = UVec2::new(1920, 1080);

/// A camera circling a ground point at constant altitude, always looking
/// at the centre.
#[derive(Debug, Clone)]
pub struct Orbit {
    centre: DVec2,
    altitude: f64,
    radius: f64,
    period: Duration,
}

impl Orbit {
    pub fn new(lat: f64, lon: f64, altitude: f64, radius: f64, period: Duration) -> Self {
        Self { centre: srs::lat_long_to_world(DVec2::new(lat, lon)), altitude, radius, period }
    }

    /// World position of the orbit centre.
    pub fn centre(&self) -> DVec2 {
        self.centre
    }

    pub fn camera_at(&self, elapsed: Duration) -> Definition {
        let phase = match self.period.is_zero() {
            true => 0.0,
            false => elapsed.as_secs_f64() / self.period.as_secs_f64() * std::f64::consts::TAU,
        };
        let offset = DVec2::new(phase.cos(), phase.sin()) * self.radius;
        let position = (self.centre + offset).extend(self.altitude);
        Definition::look_at(position, self.centre.extend(0.0), VIEWPORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn orbit_keeps_radius_and_altitude() {
        let orbit = Orbit::new(47.0, 12.7, 4000.0, 8000.0, Duration::from_secs(60));
        for s in [0, 15, 30, 59] {
            let p = orbit.camera_at(Duration::from_secs(s)).position();
            assert!(((p.truncate() - orbit.centre()).length() - 8000.0).abs() < 1e-6);
            assert_eq!(p.z, 4000.0);
        }
        let half = orbit.camera_at(Duration::from_secs(30)).position();
        let start = orbit.camera_at(Duration::ZERO).position();
        assert!((half - start).length() > 15_999.0);
        assert_eq!(start, DVec3::new(orbit.centre().x + 8000.0, orbit.centre().y, 4000.0));
    }
}
