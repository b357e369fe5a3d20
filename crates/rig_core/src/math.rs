//! Matrix helpers shared by the scene graph and the renderer.
//!
//! All projection math follows the GL clip-space convention (`z` in
//! `[-1, 1]`); backends that use a `[0, 1]` depth range convert at the very
//! end with [`GL_TO_ZERO_ONE_DEPTH`].

use glam::{Mat3, Mat4, Vec3};

/// Maps clip-space `[-1, 1]` into texture space `[0, 1]` on every axis.
///
/// Column-major: 0.5 scale on the diagonal, 0.5 translation in the last
/// column.
pub const SHADOW_BIAS: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.5, 0.5, 0.5, 1.0,
]);

/// Remaps GL clip-space depth `[-w, w]` to `[0, w]`.
pub const GL_TO_ZERO_ONE_DEPTH: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.0, 0.0, 0.5, 1.0,
]);

/// Camera-space depth of a model-view transform: the `z` component of its
/// translation column.
#[inline]
#[must_use]
pub fn view_depth(modelview: &Mat4) -> f32 {
    modelview.w_axis.z
}

/// Inverse-transpose of the upper 3x3 of `modelview`.
///
/// Returns identity for singular matrices (a zero determinant, or an
/// inverse that overflows).
#[must_use]
pub fn normal_matrix(modelview: &Mat4) -> Mat3 {
    if modelview.determinant() == 0.0 {
        return Mat3::IDENTITY;
    }
    let inverse = Mat3::from_mat4(modelview.inverse());
    if !inverse.is_finite() {
        return Mat3::IDENTITY;
    }
    inverse.transpose()
}

/// Transform from an entity's model space into shadow-map texture space:
/// `bias * light_projection * inverse(light_world) * model_world`.
#[must_use]
pub fn light_shadow_matrix(light_projection: &Mat4, light_world: &Mat4, model_world: &Mat4) -> Mat4 {
    SHADOW_BIAS * *light_projection * light_world.inverse() * *model_world
}

/// Vertical flip applied to shadow-camera views so the rendered map matches
/// texture-space Y.
#[inline]
#[must_use]
pub fn shadow_view_flip() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec4};

    #[test]
    fn bias_maps_clip_cube_to_unit_cube() {
        let lo = SHADOW_BIAS * Vec4::new(-1.0, -1.0, -1.0, 1.0);
        let hi = SHADOW_BIAS * Vec4::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(lo, Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(hi, Vec4::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn view_depth_reads_translation_z() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, -7.5));
        assert_eq!(view_depth(&m), -7.5);
    }

    #[test]
    fn normal_matrix_of_rotation_is_rotation() {
        let rot = Mat4::from_quat(Quat::from_rotation_y(0.7));
        let n = normal_matrix(&(Mat4::from_translation(Vec3::X * 4.0) * rot));
        assert!(n.abs_diff_eq(Mat3::from_mat4(rot), 1e-5));
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let m = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(&m);
        assert!((n.x_axis.x - 0.5).abs() < 1e-6);
        assert!((n.y_axis.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normal_matrix_of_tiny_scale_is_not_singular() {
        let m = Mat4::from_scale(Vec3::new(1e-4, 1.0, 1e-3));
        assert!(m.determinant().abs() < f32::EPSILON);
        let n = normal_matrix(&m);
        assert!((n.x_axis.x - 1e4).abs() < 1.0);
        assert!((n.y_axis.y - 1.0).abs() < 1e-6);
        assert!((n.z_axis.z - 1e3).abs() < 0.1);
    }

    #[test]
    fn normal_matrix_of_singular_is_identity() {
        assert_eq!(normal_matrix(&Mat4::from_scale(Vec3::ZERO)), Mat3::IDENTITY);
    }

    #[test]
    fn light_matrix_with_identity_inputs_is_bias() {
        let m = light_shadow_matrix(&Mat4::IDENTITY, &Mat4::IDENTITY, &Mat4::IDENTITY);
        assert_eq!(m, SHADOW_BIAS);
    }
}
