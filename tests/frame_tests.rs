//! Frame Orchestration Tests
//!
//! Tests for:
//! - Pass order and targets of a full frame
//! - Journal replay order per pass
//! - Visibility and shadow-caster filtering during traversal
//! - Depth-of-field target lifetime
//! - Settings changed between frames
//! - Recovery from pipeline creation failures

use glam::Vec4;

use rig::prelude::*;
use rig::render::backend::{DeviceCall, HeadlessDevice};
use rig::render::pipeline::LAYER_SHADOW_MAP;
use rig::render::{CacheSlot, TargetFrame};
use rig::scene::Text;
use rig_dev_utils::{TestScene, dof_settings, init_logging};

fn renderer() -> Renderer<HeadlessDevice> {
    init_logging();
    Renderer::new(HeadlessDevice::new(), RendererSettings::default()).unwrap()
}

fn begun_targets(device: &HeadlessDevice) -> Vec<TargetFrame> {
    device
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::BeginTarget(frame) => Some(*frame),
            _ => None,
        })
        .collect()
}

/// Primitive draws of `key`, in submission order.
fn draws_of(renderer: &Renderer<HeadlessDevice>, key: EntityKey) -> usize {
    let Some(primitive) = renderer.cache().get_primitive(key) else {
        return 0;
    };
    renderer
        .device()
        .primitive_draws()
        .filter(|d| d.primitive == Some(primitive))
        .count()
}

// ============================================================================
// Pass Order
// ============================================================================

#[test]
fn frame_renders_shadow_then_color_passes() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.passes, 3);
    // Shadow, unblended and blended each draw the quad once.
    assert_eq!(stats.draws, 3);

    let targets = begun_targets(r.device());
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[0].target, Some(r.resources().shadow_target()));
    assert_eq!(targets[0].clear, Some(Vec4::ONE));
    assert_eq!(targets[1].target, None);
    assert_eq!(targets[1].clear, Some(r.settings().clear_color));
    assert_eq!(targets[2].target, None);
    assert_eq!(targets[2].clear, None, "blended pass must not clear");
}

#[test]
fn frame_without_light_skips_shadow_pass() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    let stats = t.render_without_light(&mut r).unwrap();
    assert_eq!(stats.passes, 2);
    assert!(
        begun_targets(r.device())
            .iter()
            .all(|frame| frame.target.is_none())
    );
}

#[test]
fn shadow_pass_uses_shadow_map_viewport_for_unsized_light_camera() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    t.render(&mut r).unwrap();
    let shadow = begun_targets(r.device())[0];
    assert_eq!(shadow.viewport.width, 1024.0);
    assert_eq!(shadow.viewport.height, 1024.0);
}

#[test]
fn empty_scene_draws_only_background() {
    let mut t = TestScene::new();
    let mut r = renderer();
    r.device_mut().clear_calls();

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.draws, 0);

    let draws: Vec<_> = r.device().draws().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].primitive, None);
    assert_eq!(draws[0].pipeline, r.resources().background_pipeline());
}

#[test]
fn missing_camera_renders_nothing() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    let frame = Frame {
        camera: t.light,
        light: None,
    };
    t.scene.get_mut(t.light).unwrap().camera = None;
    let stats = r.render_frame(&mut t.scene, &frame).unwrap();
    assert_eq!(stats.passes, 0);
    assert!(begun_targets(r.device()).is_empty());
}

// ============================================================================
// Journal Order
// ============================================================================

#[test]
fn unblended_pass_draws_near_to_far() {
    let mut t = TestScene::new();
    let far = t.add_model("Far", -5.0);
    let middle = t.add_model("Middle", 0.0);
    let near = t.add_model("Near", 2.0);
    let mut r = renderer();

    r.run_pass(&mut t.scene, t.camera, RenderPass::ColorUnblended).unwrap();
    let order: Vec<_> = r.device().primitive_draws().map(|d| d.primitive).collect();
    let expected: Vec<_> = [near, middle, far]
        .iter()
        .map(|&k| r.cache().get_primitive(k))
        .collect();
    assert_eq!(order, expected);
}

#[test]
fn blended_pass_draws_far_to_near() {
    let mut t = TestScene::new();
    let near = t.add_model("Near", 2.0);
    let far = t.add_model("Far", -5.0);
    let middle = t.add_model("Middle", 0.0);
    let mut r = renderer();

    r.run_pass(&mut t.scene, t.camera, RenderPass::ColorBlended).unwrap();
    let order: Vec<_> = r.device().primitive_draws().map(|d| d.primitive).collect();
    let expected: Vec<_> = [far, middle, near]
        .iter()
        .map(|&k| r.cache().get_primitive(k))
        .collect();
    assert_eq!(order, expected);
}

#[test]
fn run_pass_never_clears() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    r.run_pass(&mut t.scene, t.camera, RenderPass::ColorUnblended).unwrap();
    let targets = begun_targets(r.device());
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].clear, None);
}

#[test]
fn draws_carry_view_space_modelview() {
    let mut t = TestScene::new();
    let quad = t.add_model("Quad", -3.0);
    let mut r = renderer();

    r.run_pass(&mut t.scene, t.camera, RenderPass::ColorUnblended).unwrap();
    let primitive = r.cache().get_primitive(quad);
    let draw = r
        .device()
        .primitive_draws()
        .find(|d| d.primitive == primitive)
        .unwrap();
    // Camera sits at z = 10.
    assert!((draw.modelview.w_axis.z - -13.0).abs() < 1e-5);
}

#[test]
fn text_is_painted_once_in_the_blended_pass() {
    let mut t = TestScene::new();
    t.scene
        .build_entity("Caption")
        .with_geometry(Geometry::Text(Text::new("hello")))
        .build();
    let mut r = renderer();
    r.device_mut().clear_calls();

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.draws, 0);
    let painted: Vec<_> = r
        .device()
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::PaintText(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(painted, vec!["hello"]);
}

// ============================================================================
// Traversal Filters
// ============================================================================

#[test]
fn shadow_pass_skips_entities_that_cast_no_shadow() {
    let mut t = TestScene::new();
    let caster = t.add_model("Caster", 0.0);
    let receiver = t
        .scene
        .build_entity("Receiver")
        .with_position(0.0, 0.0, -1.0)
        .with_geometry(Geometry::Model(Model::new(Mesh::rectangle(-1.0, -1.0, 1.0, 1.0))))
        .cast_shadow(false)
        .build();
    let mut r = renderer();
    r.device_mut().clear_calls();

    t.render(&mut r).unwrap();
    let shadow_target = Some(r.resources().shadow_target());
    let shadow_draws: Vec<_> = r
        .device()
        .primitive_draws()
        .filter(|d| d.target == shadow_target)
        .map(|d| d.primitive)
        .collect();
    assert_eq!(shadow_draws, vec![r.cache().get_primitive(caster)]);

    assert!(r.cache().get_cached(receiver, CacheSlot::Shadow).is_none());
    assert_eq!(draws_of(&r, receiver), 2, "still drawn in both color passes");
}

#[test]
fn hidden_parent_still_draws_its_children() {
    let mut t = TestScene::new();
    let parent = t
        .scene
        .build_entity("Hidden")
        .with_geometry(Geometry::Model(Model::new(Mesh::rectangle(-1.0, -1.0, 1.0, 1.0))))
        .visible(false)
        .build();
    let child = t
        .scene
        .build_entity("Child")
        .with_parent(parent)
        .with_position(1.0, 0.0, 0.0)
        .with_geometry(Geometry::Model(Model::new(Mesh::rectangle(-1.0, -1.0, 1.0, 1.0))))
        .build();
    let mut r = renderer();

    t.render_without_light(&mut r).unwrap();
    assert_eq!(draws_of(&r, parent), 0);
    assert_eq!(draws_of(&r, child), 2);
}

#[test]
fn child_inherits_parent_transform() {
    let mut t = TestScene::new();
    let parent = t
        .scene
        .build_entity("Group")
        .with_position(2.0, 0.0, 0.0)
        .build();
    let child = t
        .scene
        .build_entity("Child")
        .with_parent(parent)
        .with_position(1.0, 0.0, 0.0)
        .with_geometry(Geometry::Model(Model::new(Mesh::rectangle(-1.0, -1.0, 1.0, 1.0))))
        .build();
    let mut r = renderer();

    r.run_pass(&mut t.scene, t.camera, RenderPass::ColorUnblended).unwrap();
    let primitive = r.cache().get_primitive(child);
    let draw = r
        .device()
        .primitive_draws()
        .find(|d| d.primitive == primitive)
        .unwrap();
    assert!((draw.modelview.w_axis.x - 3.0).abs() < 1e-5);
}

// ============================================================================
// Depth of Field
// ============================================================================

fn created_target_labels(device: &HeadlessDevice) -> Vec<String> {
    device
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::CreateTarget { label, .. } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn dof_disabled_creates_no_targets() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().clear_calls();

    t.render(&mut r).unwrap();
    assert_eq!(r.device().targets_created(), 0);
    assert!(r.dof().depth_target().is_none());
}

#[test]
fn dof_enabled_renders_through_offscreen_targets() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = Renderer::new(HeadlessDevice::new(), dof_settings()).unwrap();
    r.device_mut().clear_calls();

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.passes, 4);
    assert_eq!(
        created_target_labels(r.device()),
        vec!["DoF Depth".to_string(), "DoF Color".to_string()]
    );

    let depth = r.dof().depth_target();
    let color = r.dof().color_target();
    let targets: Vec<_> = begun_targets(r.device()).iter().map(|f| f.target).collect();
    assert_eq!(
        targets,
        vec![Some(r.resources().shadow_target()), depth, color, color, None]
    );
    assert_eq!(r.dof().size(), (640, 480));
}

#[test]
fn dof_targets_survive_until_the_viewport_changes() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = Renderer::new(HeadlessDevice::new(), dof_settings()).unwrap();
    t.render(&mut r).unwrap();
    r.device_mut().clear_calls();

    t.render(&mut r).unwrap();
    assert_eq!(r.device().targets_created(), 0);

    t.scene.get_mut(t.camera).unwrap().camera.as_mut().unwrap().viewport =
        Viewport::new(0.0, 0.0, 320.0, 240.0);
    t.render(&mut r).unwrap();
    assert_eq!(r.device().targets_created(), 2);
    assert_eq!(r.dof().size(), (320, 240));
}

#[test]
fn disabling_dof_releases_its_targets() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = Renderer::new(HeadlessDevice::new(), dof_settings()).unwrap();
    t.render(&mut r).unwrap();
    r.device_mut().clear_calls();

    r.set_settings(RendererSettings::default()).unwrap();
    let released = r
        .device()
        .calls()
        .iter()
        .filter(|call| matches!(call, DeviceCall::ReleaseTarget(_)))
        .count();
    assert_eq!(released, 2);
    assert!(r.dof().color_target().is_none());

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.passes, 3);
}

#[test]
fn dof_mask_pass_uploads_focal_uniforms() {
    let mut t = TestScene::new();
    let quad = t.add_model("Quad", 0.0);
    {
        let camera = t.scene.get_mut(t.camera).unwrap().camera.as_mut().unwrap();
        camera.focal_distance = 12.0;
        camera.depth_of_field = 4.0;
    }
    let mut r = Renderer::new(HeadlessDevice::new(), dof_settings()).unwrap();
    t.render_without_light(&mut r).unwrap();

    let mask = r.cache().get_cached(quad, CacheSlot::Shadow).unwrap();
    let uniforms = r.device().uniforms(mask).unwrap();
    assert_eq!(uniforms.dof_focal_distance, -12.0);
    assert_eq!(uniforms.dof_depth_of_field, 4.0);
}

#[test]
fn dof_settings_from_json_enable_the_extra_pass() {
    let settings = RendererSettings::from_json(r#"{ "dof": { "enabled": true } }"#).unwrap();
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = Renderer::new(HeadlessDevice::new(), settings).unwrap();

    let stats = t.render_without_light(&mut r).unwrap();
    assert_eq!(stats.passes, 3);
    assert!(r.dof().depth_target().is_some());
}

// ============================================================================
// Runtime Settings
// ============================================================================

#[test]
fn new_background_color_fills_the_next_frame() {
    let mut t = TestScene::new();
    let mut r = renderer();
    t.render(&mut r).unwrap();
    let old = r.resources().background_pipeline();

    let mut settings = r.settings().clone();
    settings.background_color = Vec4::new(1.0, 0.0, 0.0, 1.0);
    r.set_settings(settings).unwrap();
    assert_ne!(r.resources().background_pipeline(), old);
    assert!(
        r.device()
            .calls()
            .contains(&DeviceCall::ReleasePipeline(old))
    );

    r.device_mut().clear_calls();
    t.render(&mut r).unwrap();
    let background: Vec<_> = r
        .device()
        .draws()
        .filter(|d| d.primitive.is_none())
        .collect();
    assert_eq!(background.len(), 1);
    assert_eq!(background[0].pipeline, r.resources().background_pipeline());
    assert_eq!(background[0].uniforms.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
}

#[test]
fn resized_shadow_map_gets_a_new_target_and_rebuilt_receivers() {
    let mut t = TestScene::new();
    let floor = t
        .scene
        .build_entity("Floor")
        .with_position(0.0, -1.0, 0.0)
        .with_geometry(Geometry::Model(Model::new(Mesh::rectangle(-5.0, -5.0, 5.0, 5.0))))
        .receive_shadow(true)
        .build();
    let mut r = renderer();
    t.render(&mut r).unwrap();
    let old_target = r.resources().shadow_target();
    let old_receiver = r.cache().get_cached(floor, CacheSlot::ColorUnblended).unwrap();
    r.device_mut().clear_calls();

    let mut settings = r.settings().clone();
    settings.shadow_map_size = 4096;
    r.set_settings(settings).unwrap();

    let calls = r.device().calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        DeviceCall::CreateTarget { label, width: 4096, height: 4096, .. } if label == "Shadow Map"
    )));
    assert!(calls.contains(&DeviceCall::ReleaseTarget(old_target)));
    assert!(calls.contains(&DeviceCall::ReleasePipeline(old_receiver)));
    assert!(r.cache().get_cached(floor, CacheSlot::ColorUnblended).is_none());

    r.device_mut().clear_calls();
    t.render(&mut r).unwrap();
    let shadow = begun_targets(r.device())[0];
    assert_eq!(shadow.target, Some(r.resources().shadow_target()));
    assert_ne!(shadow.target, Some(old_target));
    assert_eq!(shadow.viewport.width, 4096.0);
    assert_eq!(shadow.viewport.height, 4096.0);

    let receiver = r.cache().get_cached(floor, CacheSlot::ColorUnblended).unwrap();
    let layer = r
        .device()
        .pipeline_desc(receiver)
        .unwrap()
        .layer(LAYER_SHADOW_MAP)
        .unwrap();
    assert_eq!(layer.texture, Some(r.resources().shadow_map()));
}

#[test]
fn unchanged_settings_rebuild_nothing() {
    let mut t = TestScene::new();
    t.add_model("Quad", 0.0);
    let mut r = renderer();
    t.render(&mut r).unwrap();
    r.device_mut().clear_calls();

    let settings = r.settings().clone();
    r.set_settings(settings).unwrap();
    assert!(r.device().calls().is_empty());
}

#[test]
fn zero_shadow_map_size_is_rejected_and_keeps_the_old_target() {
    let mut r = renderer();
    let target = r.resources().shadow_target();

    let mut settings = r.settings().clone();
    settings.shadow_map_size = 0;
    assert!(r.set_settings(settings).is_err());
    assert_eq!(r.resources().shadow_target(), target);
    assert_eq!(r.settings().shadow_map_size, 1024);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[test]
fn failed_pipeline_skips_entity_without_aborting_frame() {
    let mut t = TestScene::new();
    let quad = t.add_model("Quad", 0.0);
    let mut r = renderer();
    r.device_mut().set_fail_pipeline_creation(true);

    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.draws, 0);
    assert!(r.cache().get_cached(quad, CacheSlot::ColorUnblended).is_none());

    r.device_mut().set_fail_pipeline_creation(false);
    let stats = t.render(&mut r).unwrap();
    assert_eq!(stats.draws, 3);
}
