//! Orbit camera with y-up spherical coordinates around a target point.

use std::f32::consts::TAU;

use glam::{Mat4, Vec3};

use super::pick::Ray;
use crate::config::ViewerConfig;

/// Pending input below this magnitude is dropped.
const SETTLE_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Orbit {
    target: Vec3,
    /// Around +Y, measured from +Z towards +X.
    azimuth: f32,
    /// From +Y.
    polar: f32,
    radius: f32,
}

impl Orbit {
    fn from_position(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let radius = offset.length();
        let polar = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };
        Self {
            target,
            azimuth: offset.x.atan2(offset.z),
            polar,
            radius,
        }
    }

    fn position(&self) -> Vec3 {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        self.target + self.radius * Vec3::new(sin_polar * sin_az, cos_polar, sin_polar * cos_az)
    }
}

#[derive(Debug, Clone)]
pub struct OrbitCamera {
    orbit: Orbit,
    initial: Orbit,
    /// Accumulated drag input, bled off by `damping` each update.
    pending_azimuth: f32,
    pending_polar: f32,
    polar_range: (f32, f32),
    distance_range: (f32, f32),
    damping: f32,
    auto_rotate: bool,
    auto_rotate_speed: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl OrbitCamera {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut orbit = Orbit::from_position(Vec3::from(config.camera_position), Vec3::ZERO);
        orbit.polar = orbit.polar.clamp(config.min_polar_angle, config.max_polar_angle);
        orbit.radius = orbit.radius.clamp(config.min_distance, config.max_distance);
        Self {
            orbit,
            initial: orbit,
            pending_azimuth: 0.0,
            pending_polar: 0.0,
            polar_range: (config.min_polar_angle, config.max_polar_angle),
            distance_range: (config.min_distance, config.max_distance),
            damping: config.damping.clamp(0.0, 1.0),
            auto_rotate: config.auto_rotate,
            auto_rotate_speed: config.auto_rotate_speed,
            fov: config.fov,
            near: config.near,
            far: config.far,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.orbit.position()
    }

    pub fn target(&self) -> Vec3 {
        self.orbit.target
    }

    pub fn azimuth(&self) -> f32 {
        self.orbit.azimuth
    }

    pub fn polar(&self) -> f32 {
        self.orbit.polar
    }

    pub fn radius(&self) -> f32 {
        self.orbit.radius
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    /// Back to the pose the camera was created with.
    pub fn reset(&mut self) {
        self.orbit = self.initial;
        self.pending_azimuth = 0.0;
        self.pending_polar = 0.0;
    }

    /// Orbit around `position` from now on, keeping the current angles and radius.
    pub fn focus_on(&mut self, position: Vec3) {
        self.orbit.target = position;
    }

    pub fn rotate_to(&mut self, azimuth: f32, polar: f32, radius: f32) {
        self.orbit.azimuth = azimuth;
        self.orbit.polar = polar.clamp(self.polar_range.0, self.polar_range.1);
        self.orbit.radius = radius.clamp(self.distance_range.0, self.distance_range.1);
        self.pending_azimuth = 0.0;
        self.pending_polar = 0.0;
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.auto_rotate = enabled;
    }

    /// User drag input in radians. Applied gradually by [`OrbitCamera::update`].
    pub fn drag(&mut self, delta_azimuth: f32, delta_polar: f32) {
        self.pending_azimuth += delta_azimuth;
        self.pending_polar += delta_polar;
    }

    /// Multiply the distance to the target, within the allowed range.
    pub fn zoom(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.orbit.radius =
                (self.orbit.radius * factor).clamp(self.distance_range.0, self.distance_range.1);
        }
    }

    /// Advance auto-rotation and damped input by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if self.auto_rotate {
            // One full turn per minute at speed 1.
            self.orbit.azimuth -= TAU / 60.0 * self.auto_rotate_speed * dt;
        }

        let (step_azimuth, step_polar) = if self.damping > 0.0 {
            (self.pending_azimuth * self.damping, self.pending_polar * self.damping)
        } else {
            (self.pending_azimuth, self.pending_polar)
        };
        self.orbit.azimuth += step_azimuth;
        self.orbit.polar = (self.orbit.polar + step_polar).clamp(self.polar_range.0, self.polar_range.1);
        self.pending_azimuth -= step_azimuth;
        self.pending_polar -= step_polar;
        if self.pending_azimuth.abs() < SETTLE_EPSILON {
            self.pending_azimuth = 0.0;
        }
        if self.pending_polar.abs() < SETTLE_EPSILON {
            self.pending_polar = 0.0;
        }

        self.orbit.azimuth = self.orbit.azimuth.rem_euclid(TAU);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.orbit.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    /// World-space ray through a point in normalized device coordinates.
    pub fn ray_through(&self, ndc_x: f32, ndc_y: f32, aspect: f32) -> Ray {
        let inverse = (self.projection(aspect) * self.view_matrix()).inverse();
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        Ray::new(near, far - near)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    use super::*;

    #[test]
    fn starts_at_configured_position() {
        let config = ViewerConfig::default();
        let camera = OrbitCamera::new(&config);
        assert!(camera.position().distance(Vec3::from(config.camera_position)) < 1e-4);
        assert!((camera.azimuth() - FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn rotate_to_clamps() {
        let config = ViewerConfig::default();
        let mut camera = OrbitCamera::new(&config);
        camera.rotate_to(1.0, 0.0, 100.0);
        assert_eq!(camera.polar(), config.min_polar_angle);
        assert_eq!(camera.radius(), config.max_distance);

        camera.rotate_to(1.0, FRAC_PI_2 * 2.0, 0.0);
        assert_eq!(camera.polar(), config.max_polar_angle);
        assert_eq!(camera.radius(), config.min_distance);
    }

    #[test]
    fn reset_restores_pose_and_target() {
        let mut camera = OrbitCamera::new(&ViewerConfig::default());
        let start = camera.position();
        camera.focus_on(Vec3::new(1.0, 0.5, 0.0));
        camera.rotate_to(2.0, 1.0, 3.0);
        camera.drag(0.5, 0.1);
        camera.reset();
        camera.update(0.016);
        assert!(camera.position().distance(start) < 1e-4);
        assert_eq!(camera.target(), Vec3::ZERO);
    }

    #[test]
    fn auto_rotate_turns_once_per_minute_at_unit_speed() {
        let config = ViewerConfig {
            auto_rotate: true,
            auto_rotate_speed: 1.0,
            ..ViewerConfig::default()
        };
        let mut camera = OrbitCamera::new(&config);
        let start = camera.azimuth();
        camera.update(15.0);
        let turned = (start - camera.azimuth()).rem_euclid(TAU);
        assert!((turned - FRAC_PI_2).abs() < 1e-4);

        camera.set_auto_rotate(false);
        let held = camera.azimuth();
        camera.update(1.0);
        assert_eq!(camera.azimuth(), held);
    }

    #[test]
    fn damped_drag_converges() {
        let mut camera = OrbitCamera::new(&ViewerConfig::default());
        let start = camera.azimuth();
        camera.drag(0.4, 0.0);
        camera.update(0.016);
        let first = camera.azimuth() - start;
        assert!(first > 0.0 && first < 0.4);
        for _ in 0..500 {
            camera.update(0.016);
        }
        assert!((camera.azimuth() - start - 0.4).abs() < 1e-3);
    }

    #[test]
    fn center_ray_hits_target() {
        let camera = OrbitCamera::new(&ViewerConfig::default());
        let ray = camera.ray_through(0.0, 0.0, 16.0 / 9.0);
        let to_target = (camera.target() - ray.origin).normalize();
        assert!(ray.direction.dot(to_target) > 0.9999);
    }
}
