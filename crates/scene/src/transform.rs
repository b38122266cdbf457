//! Translation, rotation and scale of a node.
//!
//! The node tree stores local matrices; [`Transform`] is the editable form
//! used to build or animate them.
//!
//! # Example
//!
//! ```
//! use lantern_scene::Transform;
//! use glam::{Quat, Vec3};
//!
//! let spin = Transform::from_translation(Vec3::new(1.5, 0.5, 0.0))
//!     .with_rotation(Quat::from_rotation_y(0.3))
//!     .with_scale(Vec3::splat(0.4));
//! let local = spin.to_matrix();
//! assert_eq!(local.w_axis.truncate(), Vec3::new(1.5, 0.5, 0.0));
//! ```

use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Decomposes an affine matrix. Shear is lost.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Rotates about the local Y axis.
    pub fn rotate_y(&mut self, angle: f32) {
        self.rotation = Quat::from_rotation_y(angle) * self.rotation;
    }
}

/// Inverse-transpose of `model` for transforming normals.
///
/// Returns identity for singular matrices (zero scale).
pub fn normal_matrix(model: Mat4) -> Mat4 {
    const EPSILON: f32 = 1e-6;
    if model.determinant().abs() < EPSILON {
        Mat4::IDENTITY
    } else {
        model.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.translation, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_round_trip() {
        let t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Quat::from_rotation_x(0.5))
            .with_scale(Vec3::new(2.0, 2.0, 2.0));
        let back = Transform::from_matrix(t.to_matrix());
        assert!(approx_eq_vec3(back.translation, t.translation));
        assert!(approx_eq_vec3(back.scale, t.scale));
        assert!(back.rotation.abs_diff_eq(t.rotation, EPSILON));
    }

    #[test]
    fn test_scale_applies_before_translation() {
        let t = Transform::from_translation(Vec3::X).with_scale(Vec3::splat(2.0));
        let p = t.to_matrix().transform_point3(Vec3::Y);
        assert!(approx_eq_vec3(p, Vec3::new(1.0, 2.0, 0.0)));
    }

    #[test]
    fn test_rotate_y_accumulates() {
        let mut t = Transform::IDENTITY;
        t.rotate_y(std::f32::consts::FRAC_PI_4);
        t.rotate_y(std::f32::consts::FRAC_PI_4);
        let forward = t.rotation * Vec3::NEG_Z;
        assert!(approx_eq_vec3(forward, Vec3::NEG_X));
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(model).transform_vector3(Vec3::X);
        assert!(approx_eq_vec3(n, Vec3::new(0.5, 0.0, 0.0)));
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        assert_eq!(normal_matrix(Mat4::from_scale(Vec3::ZERO)), Mat4::IDENTITY);
    }
}
