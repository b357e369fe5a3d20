use std::sync::Arc;

use glam::Vec4;

use crate::asset::Asset;
use crate::image_source::SourceType;

/// Surface description of an entity: image assets per role plus Phong
/// lighting coefficients.
#[derive(Debug, Clone)]
pub struct Material {
    pub color_source: Option<Arc<Asset>>,
    pub alpha_mask: Option<Arc<Asset>>,
    pub normal_map: Option<Arc<Asset>>,

    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    /// Fragments whose alpha-mask sample is at or below this are discarded.
    pub alpha_mask_threshold: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color_source: None,
            alpha_mask: None,
            normal_map: None,
            ambient: Vec4::new(0.23, 0.23, 0.23, 1.0),
            diffuse: Vec4::new(0.75, 0.75, 0.75, 1.0),
            specular: Vec4::new(0.64, 0.64, 0.64, 1.0),
            shininess: 100.0,
            alpha_mask_threshold: 0.5,
        }
    }
}

impl Material {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_color_source(mut self, asset: Arc<Asset>) -> Self {
        self.color_source = Some(asset);
        self
    }

    #[must_use]
    pub fn with_alpha_mask(mut self, asset: Arc<Asset>) -> Self {
        self.alpha_mask = Some(asset);
        self
    }

    #[must_use]
    pub fn with_normal_map(mut self, asset: Arc<Asset>) -> Self {
        self.normal_map = Some(asset);
        self
    }

    /// Asset bound to `role`, if any.
    #[must_use]
    pub fn asset(&self, role: SourceType) -> Option<&Arc<Asset>> {
        match role {
            SourceType::Color => self.color_source.as_ref(),
            SourceType::AlphaMask => self.alpha_mask.as_ref(),
            SourceType::NormalMap => self.normal_map.as_ref(),
        }
    }
}
