//! Camera for rendering the scene.

use glam::{Mat4, Quat, Vec3};

/// Perspective parameters. The aspect ratio comes from the render target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perspective {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// View, projection and their product, in Vulkan clip conventions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub perspective: Perspective,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            perspective: Perspective::default(),
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera on a sphere of `radius` around `target`, looking at it.
    ///
    /// `yaw` turns around the Y axis, `pitch` raises the camera.
    pub fn orbit(target: Vec3, radius: f32, yaw: f32, pitch: f32) -> Self {
        let offset = Vec3::new(
            radius * pitch.cos() * yaw.sin(),
            radius * pitch.sin(),
            radius * pitch.cos() * yaw.cos(),
        );
        let mut camera = Self {
            position: target + offset,
            ..Self::default()
        };
        camera.look_at(target);
        camera
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, forward);
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Projection with Y flipped for Vulkan's downward clip-space Y.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.perspective.fov_y,
            aspect.max(f32::EPSILON),
            self.perspective.near,
            self.perspective.far,
        );
        projection.y_axis.y *= -1.0;
        projection
    }

    /// Matrices for a target of `width` x `height` pixels.
    pub fn matrices(&self, width: u32, height: u32) -> CameraMatrices {
        let aspect = width as f32 / height.max(1) as f32;
        let view = self.view_matrix();
        let projection = self.projection_matrix(aspect);
        CameraMatrices {
            view,
            projection,
            view_projection: projection * view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        assert!(camera.forward().abs_diff_eq(Vec3::NEG_Z, EPSILON));
    }

    #[test]
    fn test_orbit_looks_at_target() {
        let target = Vec3::new(1.0, 0.0, -2.0);
        let camera = Camera::orbit(target, 4.0, 0.7, 0.3);
        assert!((camera.position.distance(target) - 4.0).abs() < EPSILON);
        let to_target = (target - camera.position).normalize();
        assert!(camera.forward().abs_diff_eq(to_target, EPSILON));
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let m = camera.matrices(800, 600);
        // A point above the camera axis lands in the upper half (negative Y).
        let clip = m.view_projection * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_view_projection_is_product() {
        let camera = Camera::orbit(Vec3::ZERO, 3.0, 0.2, 0.1);
        let m = camera.matrices(1280, 720);
        assert!(m
            .view_projection
            .abs_diff_eq(m.projection * m.view, EPSILON));
    }

    #[test]
    fn test_zero_height_does_not_produce_nan() {
        let m = Camera::default().matrices(0, 0);
        assert!(!m.projection.is_nan());
    }
}
