//! The graphics backend seam.
//!
//! The orchestrator only ever talks to a [`RenderDevice`]. Every object it
//! creates through one is referred to by an opaque handle from
//! [`rig_core::handles`]; the backend owns the actual GPU objects.

use glam::{Mat4, Vec4};
use rig_core::{PipelineHandle, PrimitiveHandle, Result, TargetHandle, TextureHandle};
use rig_scene::{Mesh, Text, Viewport};

use crate::pipeline::PipelineDesc;
use crate::uniforms::{Uniform, UniformValue};

/// Axis-aligned rectangle in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// The whole viewport.
    pub const FULL: Self = Self {
        x0: -1.0,
        y0: 1.0,
        x1: 1.0,
        y1: -1.0,
    };
}

/// Framebuffer binding for one camera pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetFrame {
    /// Offscreen target, or `None` for the main framebuffer.
    pub target: Option<TargetHandle>,
    pub viewport: Viewport,
    pub projection: Mat4,
    pub view: Mat4,
    /// Clears color to this value and depth to the far plane when set.
    pub clear: Option<Vec4>,
}

/// A graphics backend the renderer can draw through.
///
/// Calls happen on the render thread only, in frame order. Between
/// [`begin_target`](Self::begin_target) and [`end_target`](Self::end_target)
/// draws are recorded against the bound target; a backend may defer actual
/// submission until `end_target`.
pub trait RenderDevice {
    // ==== Pipelines ====

    /// Builds a pipeline from `desc`. Backends cache compiled programs by
    /// [`ProgramKey`](crate::pipeline::ProgramKey), so this is cheap for a
    /// description that only differs in bound textures.
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle>;

    fn release_pipeline(&mut self, pipeline: PipelineHandle);

    fn set_uniform(&mut self, pipeline: PipelineHandle, uniform: Uniform, value: UniformValue);

    fn set_layer_texture(&mut self, pipeline: PipelineHandle, layer: u8, texture: TextureHandle);

    // ==== Resources ====

    /// Uploads tightly packed, premultiplied RGBA8 pixels.
    fn create_texture_rgba8(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureHandle>;

    /// Frees a texture from [`create_texture_rgba8`](Self::create_texture_rgba8).
    /// Target attachments go with their target instead.
    fn release_texture(&mut self, texture: TextureHandle);

    fn create_primitive(&mut self, mesh: &Mesh) -> Result<PrimitiveHandle>;

    fn release_primitive(&mut self, primitive: PrimitiveHandle);

    /// Allocates an offscreen target with a color and a depth attachment.
    fn create_target(&mut self, label: &str, width: u32, height: u32) -> Result<TargetHandle>;

    fn release_target(&mut self, target: TargetHandle);

    /// Color attachment of `target`, sampleable as a layer texture.
    fn target_color_texture(&self, target: TargetHandle) -> Option<TextureHandle>;

    /// Depth attachment of `target`, sampleable as a layer texture.
    fn target_depth_texture(&self, target: TargetHandle) -> Option<TextureHandle>;

    // ==== Drawing ====

    fn begin_target(&mut self, frame: &TargetFrame);

    fn set_modelview(&mut self, modelview: &Mat4);

    fn draw(&mut self, primitive: PrimitiveHandle, pipeline: PipelineHandle);

    /// Fills `rect` with `pipeline`, ignoring the bound transforms.
    fn draw_rectangle(&mut self, pipeline: PipelineHandle, rect: Rect);

    /// Paints a text label at `modelview`. Backends without a text
    /// renderer skip it.
    fn paint_text(&mut self, text: &Text, modelview: &Mat4) {
        let _ = modelview;
        log::trace!("No text renderer, skipping '{}'", text.text);
    }

    /// Finishes the bound target, submitting recorded work if deferred.
    fn end_target(&mut self) -> Result<()>;
}
