use glam::{Mat4, Vec3};

use crate::Aabb;

/// Camera for 3D rendering.
///
/// Carries both the pose (orbit around `target`) and the intrinsics the
/// compositor needs: window size in logical pixels, device-pixel ratio and
/// the near/far clip distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,

    // Orbit parameters (kept in sync with position)
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,

    // Window intrinsics
    pub window_width: u32,
    pub window_height: u32,
    pub device_pixel_ratio: f32,
}

impl Camera {
    /// Create a new camera looking from `position` at `target`.
    pub fn new(position: Vec3, target: Vec3, window_width: u32, window_height: u32) -> Self {
        let offset = position - target;
        let distance = offset.length().max(1e-4);
        Self {
            position,
            target,
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
            distance,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / distance).clamp(-1.0, 1.0).asin(),
            window_width: window_width.max(1),
            window_height: window_height.max(1),
            device_pixel_ratio: 1.0,
        }
    }

    /// Aspect ratio of the window.
    pub fn aspect(&self) -> f32 {
        self.window_width as f32 / self.window_height as f32
    }

    /// Size of the framebuffer in physical pixels (window size × DPR).
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let w = (self.window_width as f32 * self.device_pixel_ratio).round() as u32;
        let h = (self.window_height as f32 * self.device_pixel_ratio).round() as u32;
        (w.max(1), h.max(1))
    }

    /// Update the window size (e.g., on window resize).
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width.max(1);
        self.window_height = height.max(1);
    }

    /// Get the view matrix (world → camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix (camera → clip space, depth in [0, 1])
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect(), self.near, self.far)
    }

    /// Rotate around the target.
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        self.pitch = (self.pitch + delta_pitch).clamp(-limit, limit);
        self.update_position_from_angles();
    }

    /// Move camera and target together in camera space.
    pub fn pan(&mut self, right: f32, up: f32, forward: f32, delta_time: f32) {
        let view_dir = (self.target - self.position).normalize_or_zero();
        let right_dir = view_dir.cross(self.up).normalize_or_zero();
        let up_dir = right_dir.cross(view_dir);

        let speed = self.distance * delta_time;
        let offset = (right_dir * right + up_dir * up + view_dir * forward) * speed;
        self.position += offset;
        self.target += offset;
    }

    /// Move towards (negative) or away from (positive) the target.
    pub fn dolly(&mut self, amount: f32) {
        let scale = (1.0 + amount * 0.001).max(0.05);
        self.distance = (self.distance * scale).max(1e-3);
        self.update_position_from_angles();
    }

    /// Recompute the position from target, distance, yaw and pitch.
    pub fn update_position_from_angles(&mut self) {
        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        self.position = self.target + offset;
    }

    /// Aim the camera at a bounding box and fit clip planes around it.
    pub fn frame_bounds(&mut self, bounds: &Aabb) {
        if bounds.is_empty() {
            return;
        }
        let size = bounds.diagonal().max(1e-3);
        self.target = bounds.centroid();
        self.distance = size * 1.5;
        self.near = self.distance * 0.01;
        self.far = self.distance * 20.0;
        self.update_position_from_angles();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_creation() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1600, 900);

        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.target, Vec3::ZERO);
        assert!((camera.aspect() - 16.0 / 9.0).abs() < 1e-6);
        assert!((camera.distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_view_matrix() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 100, 100);

        let view = camera.view_matrix();
        // Origin ends up 5 units in front of the camera (negative z)
        let p = view.transform_point3(Vec3::ZERO);
        assert!((p.z + 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_framebuffer_size_uses_device_pixel_ratio() {
        let mut camera = Camera::new(Vec3::Z, Vec3::ZERO, 640, 480);
        assert_eq!(camera.framebuffer_size(), (640, 480));

        camera.device_pixel_ratio = 2.0;
        assert_eq!(camera.framebuffer_size(), (1280, 960));

        camera.device_pixel_ratio = 0.5;
        assert_eq!(camera.framebuffer_size(), (320, 240));
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 100, 100);
        camera.orbit(0.7, 0.3);

        assert!(((camera.position - camera.target).length() - 5.0).abs() < 1e-4);
        assert!(camera.position.x.abs() > 0.1);
    }

    #[test]
    fn test_update_position_matches_initial_pose() {
        let mut camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, 100, 100);
        let before = camera.position;
        camera.update_position_from_angles();
        assert!((camera.position - before).length() < 1e-4);
    }

    #[test]
    fn test_frame_bounds() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 100, 100);
        let bounds = Aabb::from_points(Vec3::splat(9.0), Vec3::splat(11.0));
        camera.frame_bounds(&bounds);

        assert!((camera.target - Vec3::splat(10.0)).length() < 1e-5);
        assert!(camera.near < camera.distance && camera.far > camera.distance);
    }
}
