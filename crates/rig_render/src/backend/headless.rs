//! Headless Recording Backend
//!
//! A [`RenderDevice`] that draws nothing. Every call is appended to a log
//! and every pipeline keeps its description, layer textures and uniform
//! values, so tests and tools can inspect exactly what a frame would have
//! submitted.
//!
//! Programs are deduplicated by [`ProgramKey`] the same way the wgpu
//! backend does it, which makes program sharing observable without a GPU.

use glam::Mat4;
use rig_core::{PipelineHandle, PrimitiveHandle, Result, RigError, TargetHandle, TextureHandle};
use rig_scene::{Mesh, Text};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::device::{Rect, RenderDevice, TargetFrame};
use crate::pipeline::{PipelineDesc, ProgramKey};
use crate::uniforms::{Uniform, UniformBlock, UniformValue};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreatePipeline(PipelineHandle),
    ReleasePipeline(PipelineHandle),
    SetUniform {
        pipeline: PipelineHandle,
        uniform: Uniform,
        value: UniformValue,
    },
    SetLayerTexture {
        pipeline: PipelineHandle,
        layer: u8,
        texture: TextureHandle,
    },
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    ReleaseTexture(TextureHandle),
    CreatePrimitive(PrimitiveHandle),
    ReleasePrimitive(PrimitiveHandle),
    CreateTarget {
        target: TargetHandle,
        label: String,
        width: u32,
        height: u32,
    },
    ReleaseTarget(TargetHandle),
    BeginTarget(TargetFrame),
    SetModelview(Mat4),
    Draw(DrawRecord),
    PaintText(String),
    EndTarget,
}

/// State captured at the moment of a draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// Bound target; `None` is the main framebuffer.
    pub target: Option<TargetHandle>,
    pub pipeline: PipelineHandle,
    /// `None` for rectangle draws.
    pub primitive: Option<PrimitiveHandle>,
    pub modelview: Mat4,
    pub uniforms: UniformBlock,
    pub layers: SmallVec<[(u8, TextureHandle); 6]>,
}

#[derive(Debug)]
struct RecordedPipeline {
    desc: PipelineDesc,
    program: u32,
    uniforms: UniformBlock,
    live: bool,
}

#[derive(Debug, Clone, Copy)]
struct RecordedTarget {
    color: TextureHandle,
    depth: TextureHandle,
    live: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    calls: Vec<DeviceCall>,
    pipelines: Vec<RecordedPipeline>,
    programs: FxHashMap<ProgramKey, u32>,
    primitives: Vec<bool>,
    textures: u64,
    targets: Vec<RecordedTarget>,

    bound_target: Option<Option<TargetHandle>>,
    modelview: Mat4,
    fail_pipelines: bool,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `create_pipeline` fail.
    pub fn set_fail_pipeline_creation(&mut self, fail: bool) {
        self.fail_pipelines = fail;
    }

    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Draws recorded since the last [`clear_calls`](Self::clear_calls),
    /// rectangles included.
    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.calls.iter().filter_map(|call| match call {
            DeviceCall::Draw(record) => Some(record),
            _ => None,
        })
    }

    /// Primitive draws only.
    pub fn primitive_draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draws().filter(|record| record.primitive.is_some())
    }

    #[must_use]
    pub fn pipelines_created(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::CreatePipeline(_)))
            .count()
    }

    #[must_use]
    pub fn targets_created(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::CreateTarget { .. }))
            .count()
    }

    /// Distinct programs compiled so far.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_pipelines(&self) -> usize {
        self.pipelines.iter().filter(|p| p.live).count()
    }

    #[must_use]
    pub fn pipeline_desc(&self, pipeline: PipelineHandle) -> Option<&PipelineDesc> {
        self.pipelines.get(pipeline.index()).map(|p| &p.desc)
    }

    /// Program id shared by every pipeline with the same [`ProgramKey`].
    #[must_use]
    pub fn pipeline_program(&self, pipeline: PipelineHandle) -> Option<u32> {
        self.pipelines.get(pipeline.index()).map(|p| p.program)
    }

    #[must_use]
    pub fn uniforms(&self, pipeline: PipelineHandle) -> Option<&UniformBlock> {
        self.pipelines.get(pipeline.index()).map(|p| &p.uniforms)
    }

    fn pipeline_mut(&mut self, pipeline: PipelineHandle) -> Option<&mut RecordedPipeline> {
        let recorded = self.pipelines.get_mut(pipeline.index());
        if recorded.is_none() {
            log::warn!("Unknown pipeline {pipeline:?}");
        }
        recorded
    }

    fn next_texture(&mut self) -> TextureHandle {
        let texture = TextureHandle::from_raw(self.textures);
        self.textures += 1;
        texture
    }

    fn record_draw(&mut self, pipeline: PipelineHandle, primitive: Option<PrimitiveHandle>, modelview: Mat4) {
        let Some(target) = self.bound_target else {
            log::warn!("Draw outside begin_target/end_target ignored");
            return;
        };
        let Some(recorded) = self.pipelines.get(pipeline.index()) else {
            log::warn!("Draw with unknown pipeline {pipeline:?}");
            return;
        };
        let record = DrawRecord {
            target,
            pipeline,
            primitive,
            modelview,
            uniforms: recorded.uniforms,
            layers: recorded
                .desc
                .layers
                .iter()
                .filter_map(|l| l.texture.map(|t| (l.index, t)))
                .collect(),
        };
        self.calls.push(DeviceCall::Draw(record));
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        if self.fail_pipelines {
            return Err(RigError::PipelineCreation {
                label: desc.label.to_string(),
                reason: "pipeline creation disabled".to_string(),
            });
        }

        let next_program = self.programs.len() as u32;
        let program = *self.programs.entry(desc.program_key()).or_insert(next_program);
        let handle = PipelineHandle::from_raw(self.pipelines.len() as u64);
        let mut uniforms = UniformBlock::default();
        uniforms.base_color = desc.color;
        self.pipelines.push(RecordedPipeline {
            desc: desc.clone(),
            program,
            uniforms,
            live: true,
        });
        self.calls.push(DeviceCall::CreatePipeline(handle));
        Ok(handle)
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) {
        if let Some(recorded) = self.pipeline_mut(pipeline) {
            recorded.live = false;
        }
        self.calls.push(DeviceCall::ReleasePipeline(pipeline));
    }

    fn set_uniform(&mut self, pipeline: PipelineHandle, uniform: Uniform, value: UniformValue) {
        if let Some(recorded) = self.pipeline_mut(pipeline) {
            recorded.uniforms.set(uniform, value);
        }
        self.calls.push(DeviceCall::SetUniform {
            pipeline,
            uniform,
            value,
        });
    }

    fn set_layer_texture(&mut self, pipeline: PipelineHandle, layer: u8, texture: TextureHandle) {
        if let Some(recorded) = self.pipeline_mut(pipeline) {
            recorded.desc.set_layer_texture(layer, texture);
        }
        self.calls.push(DeviceCall::SetLayerTexture {
            pipeline,
            layer,
            texture,
        });
    }

    fn create_texture_rgba8(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureHandle> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RigError::TextureAllocation(format!(
                "'{label}': {} bytes for {width}x{height}, expected {expected}",
                pixels.len()
            )));
        }
        let texture = self.next_texture();
        self.calls.push(DeviceCall::CreateTexture {
            texture,
            width,
            height,
        });
        Ok(texture)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.calls.push(DeviceCall::ReleaseTexture(texture));
    }

    fn create_primitive(&mut self, mesh: &Mesh) -> Result<PrimitiveHandle> {
        let _ = mesh;
        let primitive = PrimitiveHandle::from_raw(self.primitives.len() as u64);
        self.primitives.push(true);
        self.calls.push(DeviceCall::CreatePrimitive(primitive));
        Ok(primitive)
    }

    fn release_primitive(&mut self, primitive: PrimitiveHandle) {
        if let Some(live) = self.primitives.get_mut(primitive.index()) {
            *live = false;
        }
        self.calls.push(DeviceCall::ReleasePrimitive(primitive));
    }

    fn create_target(&mut self, label: &str, width: u32, height: u32) -> Result<TargetHandle> {
        if width == 0 || height == 0 {
            return Err(RigError::TargetAllocation {
                width,
                height,
                reason: format!("'{label}' has an empty extent"),
            });
        }
        let target = TargetHandle::from_raw(self.targets.len() as u64);
        let color = self.next_texture();
        let depth = self.next_texture();
        self.targets.push(RecordedTarget {
            color,
            depth,
            live: true,
        });
        self.calls.push(DeviceCall::CreateTarget {
            target,
            label: label.to_string(),
            width,
            height,
        });
        Ok(target)
    }

    fn release_target(&mut self, target: TargetHandle) {
        if let Some(recorded) = self.targets.get_mut(target.index()) {
            recorded.live = false;
        }
        self.calls.push(DeviceCall::ReleaseTarget(target));
    }

    fn target_color_texture(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets
            .get(target.index())
            .filter(|t| t.live)
            .map(|t| t.color)
    }

    fn target_depth_texture(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets
            .get(target.index())
            .filter(|t| t.live)
            .map(|t| t.depth)
    }

    fn begin_target(&mut self, frame: &TargetFrame) {
        if self.bound_target.is_some() {
            log::warn!("begin_target while a target is bound");
        }
        self.bound_target = Some(frame.target);
        self.modelview = Mat4::IDENTITY;
        self.calls.push(DeviceCall::BeginTarget(*frame));
    }

    fn set_modelview(&mut self, modelview: &Mat4) {
        self.modelview = *modelview;
        self.calls.push(DeviceCall::SetModelview(*modelview));
    }

    fn draw(&mut self, primitive: PrimitiveHandle, pipeline: PipelineHandle) {
        self.record_draw(pipeline, Some(primitive), self.modelview);
    }

    fn draw_rectangle(&mut self, pipeline: PipelineHandle, rect: Rect) {
        let _ = rect;
        self.record_draw(pipeline, None, Mat4::IDENTITY);
    }

    fn paint_text(&mut self, text: &Text, _modelview: &Mat4) {
        self.calls.push(DeviceCall::PaintText(text.text.clone()));
    }

    fn end_target(&mut self) -> Result<()> {
        if self.bound_target.take().is_none() {
            log::warn!("end_target without a bound target");
        }
        self.calls.push(DeviceCall::EndTarget);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Snippets;
    use rig_scene::Viewport;

    fn frame() -> TargetFrame {
        TargetFrame {
            target: None,
            viewport: Viewport::new(0.0, 0.0, 8.0, 8.0),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            clear: None,
        }
    }

    #[test]
    fn pipelines_with_the_same_program_key_share_a_program() {
        let snippets = Snippets::new();
        let mut device = HeadlessDevice::new();

        let mut a = PipelineDesc::new("a");
        a.add_snippet(snippets.simple_lighting);
        let mut b = a.clone();
        b.set_layer_texture(0, TextureHandle::from_raw(5));
        b.set_layer_combine(0, crate::pipeline::LayerCombine::Modulate);
        let mut c = a.clone();
        c.add_snippet(snippets.premultiply);

        let pa = device.create_pipeline(&a).unwrap();
        let pc = device.create_pipeline(&c).unwrap();
        assert_ne!(device.pipeline_program(pa), device.pipeline_program(pc));
        assert_eq!(device.program_count(), 2);

        // b adds a layer, which is part of the program key.
        let pb = device.create_pipeline(&b).unwrap();
        assert_ne!(device.pipeline_program(pa), device.pipeline_program(pb));

        let pa2 = device.create_pipeline(&a).unwrap();
        assert_ne!(pa, pa2);
        assert_eq!(device.pipeline_program(pa), device.pipeline_program(pa2));
    }

    #[test]
    fn draws_capture_uniforms_at_draw_time() {
        let mut device = HeadlessDevice::new();
        let pipeline = device.create_pipeline(&PipelineDesc::new("p")).unwrap();
        let primitive = device.create_primitive(&Mesh::default()).unwrap();

        device.begin_target(&frame());
        device.set_uniform(pipeline, Uniform::HairPos, 0.5_f32.into());
        device.draw(primitive, pipeline);
        device.set_uniform(pipeline, Uniform::HairPos, 1.0_f32.into());
        device.draw(primitive, pipeline);
        device.end_target().unwrap();

        let positions: Vec<f32> = device.draws().map(|d| d.uniforms.hair_pos).collect();
        assert_eq!(positions, vec![0.5, 1.0]);
    }

    #[test]
    fn failing_pipeline_creation_reports_the_label() {
        let mut device = HeadlessDevice::new();
        device.set_fail_pipeline_creation(true);
        let err = device.create_pipeline(&PipelineDesc::new("Broken")).unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn released_targets_stop_resolving_attachments() {
        let mut device = HeadlessDevice::new();
        let target = device.create_target("t", 4, 4).unwrap();
        assert!(device.target_depth_texture(target).is_some());
        device.release_target(target);
        assert!(device.target_depth_texture(target).is_none());
    }
}
