//! Named shader uniforms and the per-pipeline block they pack into.
//!
//! Every uniform a snippet declares is a variant of [`Uniform`]. A misspelt
//! name is a compile error rather than a silently ignored location lookup.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    // ==== Transform ====
    NormalMatrix,
    LightShadowMatrix,

    // ==== Depth of field ====
    DofFocalDistance,
    DofDepthOfField,

    // ==== Light ====
    Light0Ambient,
    Light0Diffuse,
    Light0Specular,
    Light0DirectionNorm,

    // ==== Material ====
    MaterialAmbient,
    MaterialDiffuse,
    MaterialSpecular,
    MaterialShininess,
    MaterialAlphaThreshold,

    // ==== Hair ====
    HairPos,
    HairLayer,
    Force,

    // ==== Pointalism ====
    ScaleFactor,
    ZTrans,
    AntiScale,
}

impl Uniform {
    /// Name of the uniform as declared in shader source.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NormalMatrix => "normal_matrix",
            Self::LightShadowMatrix => "light_shadow_matrix",
            Self::DofFocalDistance => "dof_focal_distance",
            Self::DofDepthOfField => "dof_depth_of_field",
            Self::Light0Ambient => "light0_ambient",
            Self::Light0Diffuse => "light0_diffuse",
            Self::Light0Specular => "light0_specular",
            Self::Light0DirectionNorm => "light0_direction_norm",
            Self::MaterialAmbient => "material_ambient",
            Self::MaterialDiffuse => "material_diffuse",
            Self::MaterialSpecular => "material_specular",
            Self::MaterialShininess => "material_shininess",
            Self::MaterialAlphaThreshold => "material_alpha_threshold",
            Self::HairPos => "hair_pos",
            Self::HairLayer => "layer",
            Self::Force => "force",
            Self::ScaleFactor => "scale_factor",
            Self::ZTrans => "z_trans",
            Self::AntiScale => "anti_scale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        Self::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

// ─── GPU block ───────────────────────────────────────────────────────────────

/// CPU mirror of the `EntityUniforms` struct in the entity shader.
///
/// One block per pipeline. The transform fields are rewritten per draw;
/// everything else persists until set again.
#[repr(C, align(256))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub modelview: Mat4,                   // 64
    pub projection: Mat4,                  // 64
    pub light_shadow_matrix: Mat4,         // 64
    pub normal_matrix: [Vec4; 3],          // 48
    pub base_color: Vec4,                  // 16
    pub light0_ambient: Vec4,              // 16
    pub light0_diffuse: Vec4,              // 16
    pub light0_specular: Vec4,             // 16
    pub light0_direction_norm: Vec4,       // 16
    pub material_ambient: Vec4,            // 16
    pub material_diffuse: Vec4,            // 16
    pub material_specular: Vec4,           // 16
    pub material_shininess: f32,
    pub material_alpha_threshold: f32,
    pub dof_focal_distance: f32,
    pub dof_depth_of_field: f32,
    pub hair_pos: f32,
    pub hair_layer: f32,
    pub force: f32,
    pub scale_factor: f32,
    pub z_trans: f32,
    pub anti_scale: i32,
    pub(crate) _padding: [f32; 26], // pad to 512 bytes
}

impl Default for UniformBlock {
    fn default() -> Self {
        Self {
            modelview: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            light_shadow_matrix: Mat4::IDENTITY,
            normal_matrix: [Vec4::X, Vec4::Y, Vec4::Z],
            base_color: Vec4::ONE,
            dof_depth_of_field: 1.0,
            scale_factor: 1.0,
            ..Self::zeroed()
        }
    }
}

impl UniformBlock {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Writes `value` into the field backing `uniform`. Mismatched value
    /// kinds are logged and ignored.
    pub fn set(&mut self, uniform: Uniform, value: UniformValue) {
        match (uniform, value) {
            (Uniform::NormalMatrix, UniformValue::Mat3(m)) => {
                self.normal_matrix = [m.x_axis.extend(0.0), m.y_axis.extend(0.0), m.z_axis.extend(0.0)];
            }
            (Uniform::LightShadowMatrix, UniformValue::Mat4(m)) => self.light_shadow_matrix = m,

            (Uniform::DofFocalDistance, UniformValue::Float(v)) => self.dof_focal_distance = v,
            (Uniform::DofDepthOfField, UniformValue::Float(v)) => self.dof_depth_of_field = v,

            (Uniform::Light0Ambient, UniformValue::Vec4(v)) => self.light0_ambient = v,
            (Uniform::Light0Diffuse, UniformValue::Vec4(v)) => self.light0_diffuse = v,
            (Uniform::Light0Specular, UniformValue::Vec4(v)) => self.light0_specular = v,
            (Uniform::Light0DirectionNorm, UniformValue::Vec3(v)) => {
                self.light0_direction_norm = v.extend(0.0);
            }

            (Uniform::MaterialAmbient, UniformValue::Vec4(v)) => self.material_ambient = v,
            (Uniform::MaterialDiffuse, UniformValue::Vec4(v)) => self.material_diffuse = v,
            (Uniform::MaterialSpecular, UniformValue::Vec4(v)) => self.material_specular = v,
            (Uniform::MaterialShininess, UniformValue::Float(v)) => self.material_shininess = v,
            (Uniform::MaterialAlphaThreshold, UniformValue::Float(v)) => {
                self.material_alpha_threshold = v;
            }

            (Uniform::HairPos, UniformValue::Float(v)) => self.hair_pos = v,
            (Uniform::HairLayer, UniformValue::Float(v)) => self.hair_layer = v,
            (Uniform::Force, UniformValue::Float(v)) => self.force = v,

            (Uniform::ScaleFactor, UniformValue::Float(v)) => self.scale_factor = v,
            (Uniform::ZTrans, UniformValue::Float(v)) => self.z_trans = v,
            (Uniform::AntiScale, UniformValue::Int(v)) => self.anti_scale = v,

            (uniform, value) => {
                log::warn!("Uniform '{}' cannot hold {value:?}", uniform.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_matches_dynamic_offset_alignment() {
        assert_eq!(UniformBlock::SIZE, 512);
        assert_eq!(std::mem::align_of::<UniformBlock>(), 256);
    }

    #[test]
    fn set_routes_by_name_and_rejects_wrong_kinds() {
        let mut block = UniformBlock::default();
        block.set(Uniform::HairPos, 0.25.into());
        block.set(Uniform::AntiScale, 1.into());
        block.set(Uniform::Force, Vec4::ONE.into());

        assert_eq!(block.hair_pos, 0.25);
        assert_eq!(block.anti_scale, 1);
        assert_eq!(block.force, 0.0);
    }

    #[test]
    fn normal_matrix_is_padded_to_columns_of_four() {
        let mut block = UniformBlock::default();
        block.set(Uniform::NormalMatrix, Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0)).into());
        assert_eq!(block.normal_matrix[1], Vec4::new(0.0, 3.0, 0.0, 0.0));
    }
}
