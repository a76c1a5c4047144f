//! Object transforms

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Placement of an object in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create transform from position, rotation (euler angles in degrees), and scale
    pub fn from_components(position: Vec3, rotation_degrees: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: euler_degrees(rotation_degrees),
            scale,
        }
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Translate by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }
}

fn euler_degrees(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        assert_eq!(Transform::new().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_rotation_in_degrees() {
        let transform = Transform::from_components(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0), Vec3::ONE);
        let rotated = transform.matrix().transform_point3(Vec3::X);
        assert!(rotated.abs_diff_eq(-Vec3::Z, 1e-5));
    }

    #[test]
    fn test_scale_then_translate() {
        let mut transform = Transform::from_components(Vec3::ZERO, Vec3::ZERO, Vec3::splat(2.0));
        transform.translate(Vec3::new(1.0, 0.0, 0.0));
        let point = transform.matrix().transform_point3(Vec3::ONE);
        assert!(point.abs_diff_eq(Vec3::new(3.0, 2.0, 2.0), 1e-5));
    }
}
