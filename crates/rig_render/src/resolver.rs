//! Pass pipeline resolution.
//!
//! For every journal entry the resolver hands back the pipeline the entity
//! should be drawn with in the current pass. Pipelines are built from the
//! templates and snippets in [`RenderResources`] on a cache miss and reused
//! until the entity is invalidated.
//!
//! Mask passes ([`RenderPass::Shadow`] and [`RenderPass::DofDepth`]) share
//! one cache slot and only care about coverage. The two color passes each
//! get their own pipeline, differing in discard threshold, depth writes and
//! blending.

use flume::Sender;
use glam::{Mat4, Vec4};
use rig_core::math::light_shadow_matrix;
use rig_core::{PipelineHandle, PrimitiveHandle, Result, TextureHandle};
use rig_scene::{
    Entity, EntityKey, Geometry, ImageSource, Light, Material, Mesh, SourceType,
};

use crate::cache::PipelineCache;
use crate::device::RenderDevice;
use crate::events::{RenderEvent, watch_image_source, watch_nine_slice, watch_shape};
use crate::pass::{CacheSlot, RenderPass};
use crate::pipeline::{
    BlendMode, DepthState, LAYER_ALPHA_MASK, LAYER_COLOR, LAYER_HAIR, LAYER_NORMAL_MAP,
    LAYER_SHADOW_MAP, LAYER_SHAPE, LayerCombine, PipelineDesc, RenderResources,
};
use crate::uniforms::Uniform;

/// Base color of lit entity pipelines before layers and lighting apply.
const ENTITY_BASE_COLOR: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);

/// The active light as seen by one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightContext {
    pub light: Light,
    /// World transform of the light entity.
    pub world: Mat4,
    /// Projection of the light camera.
    pub projection: Mat4,
}

/// What the resolver needs to know about a cached image source.
#[derive(Debug, Clone, Copy)]
struct SourceInfo {
    texture: Option<TextureHandle>,
    is_video: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sources {
    color: Option<SourceInfo>,
    alpha_mask: Option<SourceInfo>,
    normal_map: Option<SourceInfo>,
}

/// Borrows everything pipeline resolution touches for the length of one
/// flush.
pub struct Resolver<'a, D: RenderDevice + ?Sized> {
    pub(crate) device: &'a mut D,
    pub(crate) cache: &'a mut PipelineCache,
    resources: &'a RenderResources,
    events: &'a Sender<RenderEvent>,
}

impl<'a, D: RenderDevice + ?Sized> Resolver<'a, D> {
    pub fn new(
        device: &'a mut D,
        cache: &'a mut PipelineCache,
        resources: &'a RenderResources,
        events: &'a Sender<RenderEvent>,
    ) -> Self {
        Self {
            device,
            cache,
            resources,
            events,
        }
    }

    #[inline]
    pub fn device(&mut self) -> &mut D {
        self.device
    }

    /// Pipeline for `entity` in `pass`, or `None` for an entity without
    /// geometry.
    ///
    /// Image sources for the entity's material are created first, so the
    /// pipeline sees every role the material names.
    pub fn resolve(
        &mut self,
        key: EntityKey,
        entity: &Entity,
        pass: RenderPass,
        light: Option<&LightContext>,
        world: &Mat4,
    ) -> Result<Option<PipelineHandle>> {
        let Some(geometry) = entity.geometry.as_ref() else {
            return Ok(None);
        };

        if let Some(material) = &entity.material {
            self.ensure_image_sources(key, material);
        }

        let pipeline = if pass.is_mask() {
            self.mask_pipeline(key, entity, geometry)?
        } else {
            self.color_pipeline(key, entity, geometry, pass, light, world)?
        };
        Ok(Some(pipeline))
    }

    /// Cached primitive for `key`, uploading `mesh` on a miss.
    pub fn primitive(&mut self, key: EntityKey, mesh: &Mesh) -> Result<PrimitiveHandle> {
        if let Some(primitive) = self.cache.get_primitive(key) {
            return Ok(primitive);
        }
        let primitive = self.device.create_primitive(mesh)?;
        self.cache.set_primitive(key, primitive);
        Ok(primitive)
    }

    // ── Image sources ────────────────────────────────────────────────────────

    fn ensure_image_sources(&mut self, key: EntityKey, material: &Material) {
        for role in SourceType::ALL {
            let Some(asset) = material.asset(role) else {
                continue;
            };
            if self.cache.image_source(key, role).is_some() {
                continue;
            }
            let source = ImageSource::new(asset.clone());
            let subscriptions = watch_image_source(&source, key, role, self.events);
            log::trace!("Created {role:?} image source '{}' for {key:?}", asset.path());
            self.cache.set_image_source(key, role, source, subscriptions);
        }
    }

    fn sources(&self, key: EntityKey) -> Sources {
        let info = |role| {
            self.cache.image_source(key, role).map(|source| SourceInfo {
                texture: source.texture(),
                is_video: source.is_video(),
            })
        };
        Sources {
            color: info(SourceType::Color),
            alpha_mask: info(SourceType::AlphaMask),
            normal_map: info(SourceType::NormalMap),
        }
    }

    // ── Mask passes ──────────────────────────────────────────────────────────

    fn mask_pipeline(
        &mut self,
        key: EntityKey,
        entity: &Entity,
        geometry: &Geometry,
    ) -> Result<PipelineHandle> {
        let sources = self.sources(key);

        if let Some(pipeline) = self.cache.get_cached(key, CacheSlot::Shadow) {
            self.update_mask_pipeline(pipeline, entity, geometry, sources);
            return Ok(pipeline);
        }

        let resources = self.resources;
        let snippets = &resources.snippets;
        let material = entity.material.as_ref();

        let desc = match geometry {
            Geometry::Diamond(diamond) => {
                let mut desc = resources.dof_diamond_template().clone();
                desc.set_layer_texture(LAYER_SHAPE, diamond.mask_texture());
                add_material_for_mask(resources, &mut desc, material, sources);
                desc
            }
            Geometry::Shape(shape) => {
                let mut desc = resources.dof_unshaped_template().clone();
                if shape.shaped() {
                    desc.set_layer_texture(LAYER_SHAPE, shape.shape_texture());
                }
                add_material_for_mask(resources, &mut desc, material, sources);
                desc
            }
            Geometry::NineSlice(_) => {
                let mut desc = resources.dof_unshaped_template().clone();
                add_material_for_mask(resources, &mut desc, material, sources);
                desc
            }
            Geometry::PointalismGrid(_) => {
                let mut desc = resources.dof_diamond_template().clone();
                if material.is_some() {
                    if let Some(color) = sources.color {
                        if color.is_video {
                            desc.add_snippet(snippets.pointalism_video);
                            if let Some(frame) = color.texture {
                                desc.set_layer_texture(LAYER_COLOR, frame);
                            }
                            desc.set_layer_combine(LAYER_COLOR, LayerCombine::Replace);
                        } else {
                            if let Some(texture) = color.texture {
                                desc.set_layer_texture(LAYER_COLOR, texture);
                            }
                            desc.add_snippet(snippets.pointalism_vertex);
                        }
                    }
                    if let Some(alpha) = sources.alpha_mask {
                        if alpha.is_video {
                            desc.add_snippet(snippets.alpha_mask_video);
                        } else {
                            if let Some(texture) = alpha.texture {
                                desc.set_layer_texture(LAYER_ALPHA_MASK, texture);
                            }
                            desc.add_snippet(snippets.alpha_mask);
                        }
                        desc.set_layer_combine(LAYER_ALPHA_MASK, LayerCombine::Replace);
                    }
                }
                desc
            }
            Geometry::Model(_) | Geometry::Text(_) => resources.dof_template().clone(),
        };

        let pipeline = self.device.create_pipeline(&desc)?;
        log::debug!(
            "Built mask pipeline for '{}' ({:?}, {} snippets)",
            entity.label,
            geometry.kind(),
            desc.snippets.len()
        );
        self.cache.set_cached(key, CacheSlot::Shadow, pipeline);
        self.update_mask_pipeline(pipeline, entity, geometry, sources);
        Ok(pipeline)
    }

    /// Per-call state of a mask pipeline: current video frames plus the
    /// pointalism and alpha-mask uniforms.
    fn update_mask_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        entity: &Entity,
        geometry: &Geometry,
        sources: Sources,
    ) {
        if let Geometry::PointalismGrid(grid) = geometry
            && let Some(color) = sources.color
        {
            if color.is_video
                && let Some(frame) = color.texture
            {
                self.device.set_layer_texture(pipeline, LAYER_COLOR, frame);
            }
            self.device
                .set_uniform(pipeline, Uniform::ScaleFactor, grid.scale.into());
            self.device.set_uniform(pipeline, Uniform::ZTrans, grid.z.into());
            self.device
                .set_uniform(pipeline, Uniform::AntiScale, i32::from(grid.lighter).into());
        }

        if let Some(alpha) = sources.alpha_mask {
            if alpha.is_video
                && let Some(frame) = alpha.texture
            {
                self.device.set_layer_texture(pipeline, LAYER_ALPHA_MASK, frame);
            }
            if let Some(material) = &entity.material {
                self.device.set_uniform(
                    pipeline,
                    Uniform::MaterialAlphaThreshold,
                    material.alpha_mask_threshold.into(),
                );
            }
        }
    }

    // ── Color passes ─────────────────────────────────────────────────────────

    fn color_pipeline(
        &mut self,
        key: EntityKey,
        entity: &Entity,
        geometry: &Geometry,
        pass: RenderPass,
        light: Option<&LightContext>,
        world: &Mat4,
    ) -> Result<PipelineHandle> {
        let slot = pass.cache_slot();
        let sources = self.sources(key);

        if let Some(pipeline) = self.cache.get_cached(key, slot) {
            self.update_color_pipeline(pipeline, sources, light, world);
            return Ok(pipeline);
        }

        let resources = self.resources;
        let snippets = &resources.snippets;
        let blended = pass.is_blended();

        let mut desc = PipelineDesc::new(if blended {
            "Entity Blended"
        } else {
            "Entity Unblended"
        });

        if let Some(texture) = sources.color.and_then(|s| s.texture) {
            desc.set_layer_texture(LAYER_COLOR, texture);
        }
        if let Some(texture) = sources.alpha_mask.and_then(|s| s.texture) {
            desc.set_layer_texture(LAYER_ALPHA_MASK, texture);
        }
        if let Some(texture) = sources.normal_map.and_then(|s| s.texture) {
            desc.set_layer_texture(LAYER_NORMAL_MAP, texture);
        }

        desc.color = ENTITY_BASE_COLOR;
        desc.depth = DepthState {
            test: true,
            write: !blended,
        };

        desc.add_snippet(snippets.cache_position);
        desc.add_snippet(snippets.lighting_vertex);
        if sources.normal_map.is_some() {
            desc.add_snippet(snippets.normal_map_vertex);
        }
        if entity.receive_shadow() {
            desc.add_snippet(snippets.shadow_mapping_vertex);
        }

        let mut discard = if blended {
            snippets.blended_discard
        } else {
            snippets.unblended_discard
        };

        match geometry {
            Geometry::NineSlice(nine_slice) => {
                let subscription = watch_nine_slice(nine_slice, key, self.events);
                self.cache.watch_geometry(key, subscription);
            }
            Geometry::Shape(shape) => {
                if shape.shaped() {
                    desc.set_layer_texture(LAYER_SHAPE, shape.shape_texture());
                }
                let subscription = watch_shape(shape, key, self.events);
                self.cache.watch_geometry(key, subscription);
            }
            Geometry::Diamond(diamond) => {
                desc.set_layer_texture(LAYER_SHAPE, diamond.mask_texture());
            }
            Geometry::PointalismGrid(_) => {
                if let Some(color) = sources.color {
                    desc.set_layer_texture(LAYER_SHAPE, resources.circle_texture());
                    desc.add_snippet(if color.is_video {
                        snippets.pointalism_video
                    } else {
                        snippets.pointalism_vertex
                    });
                    discard = if blended {
                        snippets.pointalism_halo
                    } else {
                        snippets.pointalism_opaque
                    };
                }
            }
            Geometry::Model(_) | Geometry::Text(_) => {}
        }

        if entity.hair.is_some() {
            desc.add_snippet(snippets.hair_vertex);
        }

        desc.add_snippet(discard);
        desc.add_snippet(snippets.unpremultiply);

        if entity.material.is_some() {
            if let Some(alpha) = sources.alpha_mask {
                if alpha.is_video {
                    desc.add_snippet(snippets.alpha_mask_video);
                    desc.set_layer_combine(LAYER_ALPHA_MASK, LayerCombine::Replace);
                } else if alpha.texture.is_some() {
                    desc.add_snippet(snippets.alpha_mask);
                    desc.set_layer_combine(LAYER_ALPHA_MASK, LayerCombine::Replace);
                }
            }
            if let Some(normal) = sources.normal_map {
                desc.add_snippet(if normal.is_video {
                    snippets.normal_map_video
                } else {
                    snippets.normal_map_fragment
                });
                desc.set_layer_combine(LAYER_NORMAL_MAP, LayerCombine::Replace);
            } else {
                desc.add_snippet(snippets.material_lighting);
            }
        } else {
            desc.add_snippet(snippets.simple_lighting);
        }

        if entity.receive_shadow() {
            desc.set_layer_texture(LAYER_SHADOW_MAP, resources.shadow_map());
            desc.set_layer_combine(LAYER_SHADOW_MAP, LayerCombine::Replace);
            desc.add_snippet(snippets.shadow_mapping_fragment);
        }

        if entity.hair.is_some() {
            desc.add_snippet(snippets.hair_fragment);
            desc.set_layer_combine(LAYER_HAIR, LayerCombine::Replace);
        }

        desc.add_snippet(snippets.premultiply);

        if !blended {
            desc.blend = BlendMode::Replace;
        }

        let pipeline = self.device.create_pipeline(&desc)?;
        log::debug!(
            "Built {} pipeline for '{}' ({:?}, {} snippets)",
            pass.label(),
            entity.label,
            geometry.kind(),
            desc.snippets.len()
        );
        self.cache.set_cached(key, slot, pipeline);
        self.update_color_pipeline(pipeline, sources, light, world);
        Ok(pipeline)
    }

    /// Per-call state of a color pipeline: the light-space matrix for the
    /// entity's current world transform and the latest video frames.
    fn update_color_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        sources: Sources,
        light: Option<&LightContext>,
        world: &Mat4,
    ) {
        if let Some(light) = light {
            let matrix = light_shadow_matrix(&light.projection, &light.world, world);
            self.device
                .set_uniform(pipeline, Uniform::LightShadowMatrix, matrix.into());
        }

        let frames = [
            (sources.color, LAYER_COLOR),
            (sources.alpha_mask, LAYER_ALPHA_MASK),
            (sources.normal_map, LAYER_NORMAL_MAP),
        ];
        for (source, layer) in frames {
            if let Some(SourceInfo {
                texture: Some(frame),
                is_video: true,
            }) = source
            {
                self.device.set_layer_texture(pipeline, layer, frame);
            }
        }
    }
}

/// Adds the material's still textures to a mask pipeline. Video sources are
/// left out, so video counts as fully opaque coverage.
fn add_material_for_mask(
    resources: &RenderResources,
    desc: &mut PipelineDesc,
    material: Option<&Material>,
    sources: Sources,
) {
    let Some(material) = material else {
        return;
    };

    if let Some(SourceInfo {
        texture: Some(texture),
        is_video: false,
    }) = sources.alpha_mask
    {
        desc.set_layer_texture(LAYER_ALPHA_MASK, texture);
        desc.add_snippet(resources.snippets.alpha_mask);
        desc.set_layer_combine(LAYER_ALPHA_MASK, LayerCombine::Replace);
    }

    if let Some(texture) = material.color_source.as_ref().and_then(|a| a.still_texture()) {
        desc.set_layer_texture(LAYER_COLOR, texture);
    }
}
