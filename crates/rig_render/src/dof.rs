//! Depth-of-Field Post Effect
//!
//! Two offscreen targets the size of the main viewport:
//!
//! - **depth target**: the mask pipelines write the per-fragment blur amount
//!   into alpha (1 on the focal plane, 0 fully out of focus);
//! - **color target**: the regular color passes.
//!
//! The composite pipeline samples both and mixes the sharp color with a
//! blurred copy by the depth target's alpha, drawn as one rectangle over the
//! main framebuffer.
//!
//! Targets are only recreated when the framebuffer size changes.

use rig_core::{PipelineHandle, Result, RigError, TargetHandle};

use crate::device::{Rect, RenderDevice};
use crate::pipeline::{BlendMode, LayerCombine, PipelineDesc, RenderResources};

/// Layer of the composite pipeline holding the color pass result.
const COMPOSITE_COLOR_LAYER: u8 = 0;
/// Layer of the composite pipeline holding the blur amount.
const COMPOSITE_DEPTH_LAYER: u8 = 1;

#[derive(Debug, Default)]
pub struct DofEffect {
    size: (u32, u32),
    depth_target: Option<TargetHandle>,
    color_target: Option<TargetHandle>,
    composite: Option<PipelineHandle>,
}

impl DofEffect {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn depth_target(&self) -> Option<TargetHandle> {
        self.depth_target
    }

    #[inline]
    #[must_use]
    pub fn color_target(&self) -> Option<TargetHandle> {
        self.color_target
    }

    /// Sizes both targets to `width` x `height`, recreating them and the
    /// composite pipeline when the size changed.
    pub fn set_framebuffer_size<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        resources: &RenderResources,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let width = width.max(1);
        let height = height.max(1);
        if self.size == (width, height) && self.composite.is_some() {
            return Ok(());
        }

        self.release(device);

        let depth_target = device.create_target("DoF Depth", width, height)?;
        let color_target = device.create_target("DoF Color", width, height)?;
        self.depth_target = Some(depth_target);
        self.color_target = Some(color_target);
        self.size = (width, height);

        let missing = |target: TargetHandle| RigError::InvalidHandle {
            kind: TargetHandle::KIND,
            index: target.raw(),
        };
        let color = device
            .target_color_texture(color_target)
            .ok_or_else(|| missing(color_target))?;
        let depth = device
            .target_color_texture(depth_target)
            .ok_or_else(|| missing(depth_target))?;

        let mut desc = PipelineDesc::new("DoF Composite");
        desc.blend = BlendMode::Replace;
        desc.set_layer_texture(COMPOSITE_COLOR_LAYER, color);
        desc.set_layer_combine(COMPOSITE_COLOR_LAYER, LayerCombine::Replace);
        desc.set_layer_texture(COMPOSITE_DEPTH_LAYER, depth);
        desc.set_layer_combine(COMPOSITE_DEPTH_LAYER, LayerCombine::Replace);
        desc.add_snippet(resources.snippets.dof_composite);
        self.composite = Some(device.create_pipeline(&desc)?);

        log::debug!("DoF targets resized to {width}x{height}");
        Ok(())
    }

    /// Draws the composite over the currently bound target.
    pub fn draw<D: RenderDevice + ?Sized>(&self, device: &mut D) {
        if let Some(composite) = self.composite {
            device.draw_rectangle(composite, Rect::FULL);
        }
    }

    pub fn release<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(composite) = self.composite.take() {
            device.release_pipeline(composite);
        }
        for target in [self.depth_target.take(), self.color_target.take()]
            .into_iter()
            .flatten()
        {
            device.release_target(target);
        }
        self.size = (0, 0);
    }
}
