use glam::{EulerRot, Mat4, Quat, Vec3};

/// Local TRS transform of an entity relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    #[must_use]
    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    /// Decomposes an affine matrix. Shear is lost.
    #[must_use]
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Local matrix: translate * rotate * scale.
    #[inline]
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let mut t = Transform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        t.scale = Vec3::splat(2.0);
        t.rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);

        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, -5.0), 1e-5), "got {p}");
    }

    #[test]
    fn from_matrix_round_trips_trs() {
        let mut t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        t.set_rotation_euler(0.1, 0.2, 0.3);
        let back = Transform::from_matrix(&t.matrix());
        assert!(back.position.abs_diff_eq(t.position, 1e-5));
        assert!(back.matrix().abs_diff_eq(t.matrix(), 1e-5));
    }
}
