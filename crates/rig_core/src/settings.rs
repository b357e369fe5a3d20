//! Renderer Settings
//!
//! Static configuration for the frame orchestrator: background color, the
//! light's shadow projection, opacity thresholds used when splitting geometry
//! between the blended and unblended color passes, and depth-of-field.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rig_core::settings::{RendererSettings, DofSettings};
//!
//! let settings = RendererSettings {
//!     dof: DofSettings { enabled: true, ..Default::default() },
//!     ..Default::default()
//! };
//!
//! // Or from a host-provided JSON document
//! let settings = RendererSettings::from_json(r#"{ "shadow_map_size": 2048 }"#)?;
//! ```

use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RigError};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Alpha at or above which a fragment counts as opaque.
///
/// The blended pass discards such fragments and the unblended pass keeps
/// only them, so each fragment is drawn by exactly one color pass.
pub const OPAQUE_THRESHOLD: f32 = 0.9999;

/// Opaque/halo split used by pointalism cells instead of [`OPAQUE_THRESHOLD`].
pub const POINTALISM_OPAQUE_THRESHOLD: f32 = 0.90;

/// Hair fragments below this alpha are discarded.
pub const HAIR_ALPHA_THRESHOLD: f32 = 0.9;

/// Depth bias added to shadow-map samples before comparison.
pub const SHADOW_DEPTH_BIAS: f32 = 0.0005;

/// Color scale applied to fragments found to be in shadow.
pub const SHADOW_DARKENING: f32 = 0.5;

/// Width a live video source is laid out at when it reports ready.
pub const VIDEO_LAYOUT_WIDTH: u32 = 640;

// ---------------------------------------------------------------------------
// ShadowProjection
// ---------------------------------------------------------------------------

/// Orthographic volume rendered by the light camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowProjection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ShadowProjection {
    fn default() -> Self {
        Self {
            left: -1000.0,
            right: 1000.0,
            bottom: -1000.0,
            top: 1000.0,
            near: 1.1,
            far: 1500.0,
        }
    }
}

impl ShadowProjection {
    /// GL-convention orthographic projection matrix.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

// ---------------------------------------------------------------------------
// DofSettings
// ---------------------------------------------------------------------------

/// Depth-of-field configuration.
///
/// The focal plane itself lives on the camera; this only switches the
/// two offscreen passes and the final composite on or off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DofSettings {
    pub enabled: bool,
    /// Clear color of the depth pass target. Alpha carries the blur amount,
    /// so the default is fully sharp white.
    pub depth_clear: Vec4,
}

impl Default for DofSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            depth_clear: Vec4::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Frame orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Fill color drawn behind the scene at the start of the unblended pass.
    pub background_color: Vec4,
    /// Clear color of the main framebuffer.
    pub clear_color: Vec4,
    /// Edge length of the square shadow map, in texels.
    pub shadow_map_size: u32,
    pub shadow_projection: ShadowProjection,
    pub dof: DofSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            background_color: Vec4::new(0.22, 0.22, 0.22, 1.0),
            clear_color: Vec4::new(0.22, 0.22, 0.22, 1.0),
            shadow_map_size: 1024,
            shadow_projection: ShadowProjection::default(),
            dof: DofSettings::default(),
        }
    }
}

impl RendererSettings {
    /// Parses settings from JSON; missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(source)
            .map_err(|e| RigError::InvalidSettings(e.to_string()))?;
        if settings.shadow_map_size == 0 {
            return Err(RigError::InvalidSettings(
                "shadow_map_size must be non-zero".to_string(),
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let s = RendererSettings::from_json(r#"{ "shadow_map_size": 2048 }"#).unwrap();
        assert_eq!(s.shadow_map_size, 2048);
        assert_eq!(s.shadow_projection, ShadowProjection::default());
        assert!(!s.dof.enabled);
    }

    #[test]
    fn zero_shadow_map_is_rejected() {
        let err = RendererSettings::from_json(r#"{ "shadow_map_size": 0 }"#).unwrap_err();
        assert!(matches!(err, RigError::InvalidSettings(_)));
    }

    #[test]
    fn nested_dof_flag_parses() {
        let s = RendererSettings::from_json(r#"{ "dof": { "enabled": true } }"#).unwrap();
        assert!(s.dof.enabled);
        assert_eq!(s.dof.depth_clear, Vec4::ONE);
    }
}
