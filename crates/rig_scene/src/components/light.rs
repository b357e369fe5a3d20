use glam::{Mat4, Vec3, Vec4};

/// Directional light. Its direction is the world-space +Z axis of the
/// owning entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            diffuse: Vec4::new(0.6, 0.6, 0.6, 1.0),
            specular: Vec4::new(0.4, 0.4, 0.4, 1.0),
        }
    }
}

impl Light {
    /// Normalized light direction for an entity with world transform `world`.
    #[must_use]
    pub fn direction(world: &Mat4) -> Vec3 {
        world.transform_vector3(Vec3::Z).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn direction_follows_rotation_not_translation() {
        let world = Mat4::from_rotation_translation(
            Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 20.0, 30.0),
        );
        let dir = Light::direction(&world);
        assert!(dir.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5), "got {dir}");
    }
}
