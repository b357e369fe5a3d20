//! Per-pass draw journal.
//!
//! Traversal only records which entities to draw and where. Flushing sorts
//! the records by camera-space depth, resolves each entity's pipeline and
//! issues the draws, so a pass draws in a defined order no matter how the
//! scene graph is laid out.

use glam::Mat4;
use rig_core::math::{normal_matrix, view_depth};
use rig_scene::{Entity, EntityKey, Geometry, Hair, Material, Scene};

use crate::device::RenderDevice;
use crate::pass::RenderPass;
use crate::pipeline::LAYER_HAIR;
use crate::resolver::{LightContext, Resolver};
use crate::uniforms::Uniform;

/// One logged draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JournalEntry {
    pub entity: EntityKey,
    /// Camera view times the entity's world transform.
    pub modelview: Mat4,
    pub world: Mat4,
}

/// Per-pass parameters the flush applies to every entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushParams {
    pub pass: RenderPass,
    /// Camera focal distance, positive in front of the camera.
    pub focal_distance: f32,
    pub depth_of_field: f32,
    pub light: Option<LightContext>,
}

impl FlushParams {
    #[must_use]
    pub fn new(pass: RenderPass) -> Self {
        Self {
            pass,
            focal_distance: 0.0,
            depth_of_field: 1.0,
            light: None,
        }
    }
}

/// Growable list of [`JournalEntry`]s, cleared by every flush.
#[derive(Debug, Default)]
pub struct RenderJournal {
    entries: Vec<JournalEntry>,
}

impl RenderJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn log(&mut self, entity: EntityKey, modelview: Mat4, world: Mat4) {
        self.entries.push(JournalEntry {
            entity,
            modelview,
            world,
        });
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Drops every entry without drawing, keeping capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sorts ascending by view-space Z. Equal depths keep no particular
    /// order.
    fn sort(&mut self) {
        self.entries
            .sort_unstable_by(|a, b| view_depth(&a.modelview).total_cmp(&view_depth(&b.modelview)));
    }

    /// Draws every logged entry for `params.pass` and empties the journal.
    ///
    /// Entities whose pipeline or primitive cannot be created are skipped
    /// for this flush and logged. Returns the number of primitive draws
    /// issued.
    pub fn flush<D: RenderDevice + ?Sized>(
        &mut self,
        resolver: &mut Resolver<'_, D>,
        scene: &Scene,
        params: &FlushParams,
    ) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        let pass = params.pass;
        self.sort();
        let count = self.entries.len();
        let mut draws = 0;

        // View space looks down -Z, so ascending Z is far to near. The
        // blended pass replays that order; every other pass replays it
        // reversed.
        for i in 0..count {
            let entry = if pass.back_to_front() {
                self.entries[i]
            } else {
                self.entries[count - 1 - i]
            };

            let Some(entity) = scene.get(entry.entity) else {
                continue;
            };
            let Some(geometry) = entity.geometry.as_ref() else {
                continue;
            };

            let pipeline = match resolver.resolve(
                entry.entity,
                entity,
                pass,
                params.light.as_ref(),
                &entry.world,
            ) {
                Ok(Some(pipeline)) => pipeline,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!(
                        "Skipping '{}' in {} pass: {err}",
                        entity.label,
                        pass.label()
                    );
                    continue;
                }
            };

            let device = resolver.device();
            if pass.is_mask() {
                device.set_uniform(pipeline, Uniform::DofFocalDistance, (-params.focal_distance).into());
                device.set_uniform(pipeline, Uniform::DofDepthOfField, params.depth_of_field.into());
            } else {
                if let Some(light) = &params.light {
                    device.set_uniform(pipeline, Uniform::Light0Ambient, light.light.ambient.into());
                    device.set_uniform(pipeline, Uniform::Light0Diffuse, light.light.diffuse.into());
                    device.set_uniform(pipeline, Uniform::Light0Specular, light.light.specular.into());
                    device.set_uniform(
                        pipeline,
                        Uniform::Light0DirectionNorm,
                        rig_scene::Light::direction(&light.world).into(),
                    );
                }
                if let Some(material) = &entity.material {
                    set_material_uniforms(device, pipeline, material);
                }
                device.set_uniform(
                    pipeline,
                    Uniform::NormalMatrix,
                    normal_matrix(&entry.modelview).into(),
                );
            }

            match geometry.mesh() {
                Some(mesh) => {
                    let primitive = match resolver.primitive(entry.entity, mesh) {
                        Ok(primitive) => primitive,
                        Err(err) => {
                            log::warn!("Skipping '{}': {err}", entity.label);
                            continue;
                        }
                    };

                    let device = resolver.device();
                    device.set_modelview(&entry.modelview);

                    match (&entity.hair, &entity.material) {
                        (Some(hair), Some(material)) => {
                            draws += draw_hair(device, primitive, pipeline, hair, material);
                        }
                        (Some(_), None) => {}
                        (None, _) => {
                            device.draw(primitive, pipeline);
                            draws += 1;
                        }
                    }
                }
                None => {
                    if let Geometry::Text(text) = geometry
                        && pass == RenderPass::ColorBlended
                    {
                        let device = resolver.device();
                        device.set_modelview(&entry.modelview);
                        device.paint_text(text, &entry.modelview);
                    }
                }
            }
        }

        self.entries.clear();
        log::trace!("{} pass flushed {count} entries, {draws} draws", pass.label());
        draws
    }
}

fn set_material_uniforms<D: RenderDevice + ?Sized>(
    device: &mut D,
    pipeline: rig_core::PipelineHandle,
    material: &Material,
) {
    device.set_uniform(pipeline, Uniform::MaterialAmbient, material.ambient.into());
    device.set_uniform(pipeline, Uniform::MaterialDiffuse, material.diffuse.into());
    device.set_uniform(pipeline, Uniform::MaterialSpecular, material.specular.into());
    device.set_uniform(pipeline, Uniform::MaterialShininess, material.shininess.into());
    device.set_uniform(
        pipeline,
        Uniform::MaterialAlphaThreshold,
        material.alpha_mask_threshold.into(),
    );
}

/// Base draw with the color source on the hair layer, then one draw per
/// shell, each pushed further out along the normal.
fn draw_hair<D: RenderDevice + ?Sized>(
    device: &mut D,
    primitive: rig_core::PrimitiveHandle,
    pipeline: rig_core::PipelineHandle,
    hair: &Hair,
    material: &Material,
) -> usize {
    device.set_uniform(pipeline, Uniform::Force, hair.gravity.into());

    if let Some(texture) = material.color_source.as_ref().and_then(|a| a.still_texture()) {
        device.set_layer_texture(pipeline, LAYER_HAIR, texture);
    }
    device.set_uniform(pipeline, Uniform::HairLayer, 0.0_f32.into());
    device.set_uniform(pipeline, Uniform::HairPos, 0.0_f32.into());
    device.draw(primitive, pipeline);
    let mut draws = 1;

    let groups = hair.groups();
    if hair.n_shells == 0 {
        return draws;
    }
    for i in 0..hair.resolution {
        for j in 0..groups {
            let layer = (groups * i + j) as f32 / hair.n_shells as f32;
            if let Some(texture) = hair.texture(i) {
                device.set_layer_texture(pipeline, LAYER_HAIR, texture);
            }
            device.set_uniform(pipeline, Uniform::HairLayer, layer.into());
            device.set_uniform(pipeline, Uniform::HairPos, (hair.length * layer).into());
            device.draw(primitive, pipeline);
            draws += 1;
        }
    }
    draws
}

/// Entity visibility for `pass`, as checked during traversal.
#[must_use]
pub fn is_drawn_in(entity: &Entity, pass: RenderPass) -> bool {
    entity.visible() && (pass != RenderPass::Shadow || entity.cast_shadow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flume::Sender;
    use glam::{Vec2, Vec3};
    use rig_core::RendererSettings;
    use rig_scene::{Mesh, Model, Viewport};
    use slotmap::KeyData;

    use crate::backend::HeadlessDevice;
    use crate::cache::PipelineCache;
    use crate::device::TargetFrame;
    use crate::events::{EventQueue, RenderEvent};
    use crate::pipeline::RenderResources;

    fn key(n: u64) -> EntityKey {
        EntityKey::from(KeyData::from_ffi(n))
    }

    fn at_depth(z: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, z))
    }

    struct Harness {
        device: HeadlessDevice,
        cache: PipelineCache,
        resources: RenderResources,
        events: Sender<RenderEvent>,
        _queue: EventQueue,
        scene: Scene,
    }

    impl Harness {
        fn new() -> Self {
            let mut device = HeadlessDevice::new();
            let resources = RenderResources::new(&mut device, &RendererSettings::default()).unwrap();
            let queue = EventQueue::new();
            let mut harness = Self {
                device,
                cache: PipelineCache::new(),
                resources,
                events: queue.sender(),
                _queue: queue,
                scene: Scene::new(),
            };
            harness.device.begin_target(&TargetFrame {
                target: None,
                viewport: Viewport::new(0.0, 0.0, 64.0, 64.0),
                projection: Mat4::IDENTITY,
                view: Mat4::IDENTITY,
                clear: None,
            });
            harness.device.clear_calls();
            harness
        }

        fn add_quad(&mut self, label: &str) -> EntityKey {
            self.scene
                .build_entity(label)
                .with_geometry(Geometry::Model(Model::new(Mesh::centered_rectangle(Vec2::ONE))))
                .build()
        }

        fn flush(&mut self, journal: &mut RenderJournal, pass: RenderPass) -> usize {
            let mut resolver =
                Resolver::new(&mut self.device, &mut self.cache, &self.resources, &self.events);
            journal.flush(&mut resolver, &self.scene, &FlushParams::new(pass))
        }

        fn drawn_depths(&self) -> Vec<f32> {
            self.device
                .primitive_draws()
                .map(|draw| view_depth(&draw.modelview))
                .collect()
        }
    }

    // ========================================================================
    // Flush ordering
    // ========================================================================

    #[test]
    fn blended_replays_far_to_near_others_near_to_far() {
        let mut harness = Harness::new();
        let keys: Vec<EntityKey> = (0..4).map(|i| harness.add_quad(&format!("q{i}"))).collect();
        let depths = [5.0, -3.0, 0.0, -10.0];
        let mut journal = RenderJournal::new();

        for (pass, expected) in [
            (RenderPass::ColorBlended, vec![-10.0, -3.0, 0.0, 5.0]),
            (RenderPass::ColorUnblended, vec![5.0, 0.0, -3.0, -10.0]),
            (RenderPass::Shadow, vec![5.0, 0.0, -3.0, -10.0]),
        ] {
            for (key, z) in keys.iter().zip(depths) {
                journal.log(*key, at_depth(z), Mat4::IDENTITY);
            }
            harness.device.clear_calls();
            assert_eq!(harness.flush(&mut journal, pass), 4);
            assert_eq!(harness.drawn_depths(), expected, "{pass:?}");
        }
    }

    // ========================================================================
    // Storage
    // ========================================================================

    #[test]
    fn flush_empties_journal_and_keeps_capacity() {
        let mut harness = Harness::new();
        let mut journal = RenderJournal::new();
        for i in 0..32 {
            let key = harness.add_quad(&format!("q{i}"));
            journal.log(key, at_depth(-(i as f32)), Mat4::IDENTITY);
        }
        let capacity = journal.entries.capacity();

        assert_eq!(harness.flush(&mut journal, RenderPass::ColorUnblended), 32);
        assert_eq!(journal.len(), 0);
        assert!(journal.is_empty());
        assert_eq!(journal.entries.capacity(), capacity);

        // A refill up to the old size does not grow the buffer.
        for i in 0..32 {
            journal.log(key(i + 1), Mat4::IDENTITY, Mat4::IDENTITY);
        }
        assert_eq!(journal.entries.capacity(), capacity);
    }

    #[test]
    fn empty_flush_touches_no_device_state() {
        let mut harness = Harness::new();
        let mut journal = RenderJournal::new();
        assert_eq!(harness.flush(&mut journal, RenderPass::ColorBlended), 0);
        assert!(harness.device.calls().is_empty());
        assert!(harness.cache.is_empty());
    }

    #[test]
    fn flush_skips_entries_of_removed_entities() {
        let mut harness = Harness::new();
        let live = harness.add_quad("live");
        let mut journal = RenderJournal::new();
        journal.log(live, at_depth(-1.0), Mat4::IDENTITY);
        journal.log(key(999), at_depth(-2.0), Mat4::IDENTITY);

        assert_eq!(harness.flush(&mut journal, RenderPass::ColorUnblended), 1);
        assert!(journal.is_empty());
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut journal = RenderJournal::new();
        for i in 0..32 {
            journal.log(key(i + 1), Mat4::IDENTITY, Mat4::IDENTITY);
        }
        let capacity = journal.entries.capacity();
        journal.clear();
        assert!(journal.is_empty());
        assert_eq!(journal.entries.capacity(), capacity);
    }

    #[test]
    fn shadow_pass_skips_non_casters() {
        let mut entity = Entity::new("e");
        assert!(is_drawn_in(&entity, RenderPass::Shadow));
        entity.set_cast_shadow(false);
        assert!(!is_drawn_in(&entity, RenderPass::Shadow));
        assert!(is_drawn_in(&entity, RenderPass::ColorUnblended));
        entity.set_visible(false);
        assert!(!is_drawn_in(&entity, RenderPass::ColorBlended));
    }
}
