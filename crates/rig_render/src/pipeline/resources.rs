//! Render-wide, immutable pipeline resources.

use glam::Vec4;
use rig_core::{PipelineHandle, Result, RendererSettings, RigError, TargetHandle, TextureHandle};

use super::desc::{BlendMode, ColorMask, DepthState, LAYER_SHAPE, PipelineDesc};
use super::snippet::Snippets;
use crate::device::RenderDevice;

const CIRCLE_TEX_RADIUS: u32 = 16;
const CIRCLE_TEX_PADDING: u32 = 16;

/// Snippet registry, mask templates and the device objects shared by every
/// entity.
///
/// Built once before the first frame. Only the background pipeline and the
/// shadow target are ever rebuilt, when the settings they come from change.
/// All pipelines must take their snippets from [`RenderResources::snippets`];
/// see [`snippet`](super::snippet) for why.
#[derive(Debug)]
pub struct RenderResources {
    pub snippets: Snippets,

    dof_diamond: PipelineDesc,
    dof_unshaped: PipelineDesc,
    dof_plain: PipelineDesc,

    circle_texture: TextureHandle,
    shadow_target: TargetHandle,
    shadow_map: TextureHandle,
    background: PipelineHandle,
}

impl RenderResources {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D, settings: &RendererSettings) -> Result<Self> {
        let snippets = Snippets::new();

        let size = 2 * (CIRCLE_TEX_RADIUS + CIRCLE_TEX_PADDING);
        let circle_texture = device.create_texture_rgba8(
            "Circle",
            size,
            size,
            &circle_pixels(CIRCLE_TEX_RADIUS, CIRCLE_TEX_PADDING),
        )?;

        let (shadow_target, shadow_map) = create_shadow_target(device, settings.shadow_map_size)?;
        let background = create_background(device, settings.background_color)?;

        let template = dof_template(&snippets);

        let mut dof_diamond = template.clone();
        dof_diamond.label = "DoF Diamond";
        dof_diamond.set_layer_texture(LAYER_SHAPE, circle_texture);
        dof_diamond.add_snippet(snippets.dof_diamond);

        let mut dof_unshaped = template.clone();
        dof_unshaped.label = "DoF Unshaped";
        dof_unshaped.add_snippet(snippets.dof_unshaped);

        let mut dof_plain = template;
        dof_plain.label = "DoF";
        dof_plain.add_snippet(snippets.dof_plain);

        log::debug!(
            "Render resources ready: {} snippets, shadow map {}x{}",
            snippets.all().len(),
            settings.shadow_map_size,
            settings.shadow_map_size
        );

        Ok(Self {
            snippets,
            dof_diamond,
            dof_unshaped,
            dof_plain,
            circle_texture,
            shadow_target,
            shadow_map,
            background,
        })
    }

    /// Template for geometry whose silhouette comes from the circle texture.
    #[inline]
    #[must_use]
    pub fn dof_diamond_template(&self) -> &PipelineDesc {
        &self.dof_diamond
    }

    /// Template for rectangular geometry; drops nearly transparent texels.
    #[inline]
    #[must_use]
    pub fn dof_unshaped_template(&self) -> &PipelineDesc {
        &self.dof_unshaped
    }

    #[inline]
    #[must_use]
    pub fn dof_template(&self) -> &PipelineDesc {
        &self.dof_plain
    }

    #[inline]
    #[must_use]
    pub fn circle_texture(&self) -> TextureHandle {
        self.circle_texture
    }

    /// Render target the light camera draws the shadow pass into.
    #[inline]
    #[must_use]
    pub fn shadow_target(&self) -> TargetHandle {
        self.shadow_target
    }

    /// Depth attachment of [`shadow_target`](Self::shadow_target).
    #[inline]
    #[must_use]
    pub fn shadow_map(&self) -> TextureHandle {
        self.shadow_map
    }

    /// Flat pipeline in the configured background color.
    #[inline]
    #[must_use]
    pub fn background_pipeline(&self) -> PipelineHandle {
        self.background
    }

    /// Replaces the background pipeline with one filling `color`.
    pub fn set_background_color<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        color: Vec4,
    ) -> Result<()> {
        let background = create_background(device, color)?;
        device.release_pipeline(std::mem::replace(&mut self.background, background));
        Ok(())
    }

    /// Replaces the shadow target with a `size` x `size` one. Pipelines
    /// sampling the previous [`shadow_map`](Self::shadow_map) are left
    /// dangling and must be dropped by the caller.
    pub fn resize_shadow_map<D: RenderDevice + ?Sized>(&mut self, device: &mut D, size: u32) -> Result<()> {
        let (shadow_target, shadow_map) = create_shadow_target(device, size)?;
        device.release_target(std::mem::replace(&mut self.shadow_target, shadow_target));
        self.shadow_map = shadow_map;
        log::debug!("Shadow map resized to {size}x{size}");
        Ok(())
    }

    pub fn release<D: RenderDevice + ?Sized>(&self, device: &mut D) {
        device.release_pipeline(self.background);
        device.release_target(self.shadow_target);
        device.release_texture(self.circle_texture);
    }
}

fn create_shadow_target<D: RenderDevice + ?Sized>(
    device: &mut D,
    size: u32,
) -> Result<(TargetHandle, TextureHandle)> {
    let target = device.create_target("Shadow Map", size, size)?;
    let Some(depth) = device.target_depth_texture(target) else {
        device.release_target(target);
        return Err(RigError::InvalidHandle {
            kind: TargetHandle::KIND,
            index: target.raw(),
        });
    };
    Ok((target, depth))
}

fn create_background<D: RenderDevice + ?Sized>(device: &mut D, color: Vec4) -> Result<PipelineHandle> {
    let mut desc = PipelineDesc::new("Background");
    desc.color = color;
    desc.blend = BlendMode::Replace;
    device.create_pipeline(&desc)
}

/// Writes the blur factor into alpha only, over the existing color.
fn dof_template(snippets: &Snippets) -> PipelineDesc {
    let mut desc = PipelineDesc::new("DoF Template");
    desc.color_mask = ColorMask::ALPHA;
    desc.blend = BlendMode::Replace;
    desc.depth = DepthState {
        test: true,
        write: true,
    };
    desc.add_snippet(snippets.cache_position);
    desc.add_snippet(snippets.dof_vertex);
    desc
}

/// Premultiplied white disc of `radius` texels, fading to transparent over
/// `padding` texels.
#[must_use]
pub fn circle_pixels(radius: u32, padding: u32) -> Vec<u8> {
    let size = 2 * (radius + padding);
    let center = size as f32 / 2.0;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            let alpha = if dist <= radius as f32 {
                1.0
            } else {
                (1.0 - (dist - radius as f32) / padding.max(1) as f32).clamp(0.0, 1.0)
            };
            let v = (alpha * 255.0).round() as u8;
            pixels.extend_from_slice(&[v, v, v, v]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_is_opaque_inside_and_clear_at_corners() {
        let pixels = circle_pixels(16, 16);
        let size = 64usize;
        assert_eq!(pixels.len(), size * size * 4);

        let alpha = |x: usize, y: usize| pixels[(y * size + x) * 4 + 3];
        assert_eq!(alpha(32, 32), 255);
        assert_eq!(alpha(0, 0), 0);
        let halo = alpha(32, 32 + 24);
        assert!(halo > 0 && halo < 255, "halo alpha {halo}");
    }
}
