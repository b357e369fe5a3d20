//! Frame Orchestrator
//!
//! [`Renderer`] drives one frame of a Rig scene through its passes:
//!
//! ```text
//! light camera ── Shadow ──────────────► shadow target
//! main camera  ── DofDepth ────────────► DoF depth target   (DoF only)
//!              ── ColorUnblended ──┐
//!              ── ColorBlended ────┴───► main framebuffer, or the DoF
//!                                        color target plus a composite
//! ```
//!
//! Each pass updates the camera's view transform, binds its target,
//! traverses the scene into the journal and flushes the journal.
//!
//! Notifications raised by image sources and geometry since the previous
//! frame are applied at the start of [`Renderer::render_frame`], before any
//! pass runs.

use flume::Sender;
use glam::{Mat4, Vec4};
use rig_core::math::shadow_view_flip;
use rig_core::settings::VIDEO_LAYOUT_WIDTH;
use rig_core::{RendererSettings, Result, TargetHandle};
use rig_scene::{
    Diamond, Entity, EntityKey, Geometry, PointalismGrid, Scene, SceneVisitor, SourceType,
    Viewport, VisitFlow,
};

use crate::cache::{PipelineCache, Released};
use crate::device::{Rect, RenderDevice, TargetFrame};
use crate::dof::DofEffect;
use crate::events::{EventQueue, RenderEvent};
use crate::journal::{FlushParams, RenderJournal, is_drawn_in};
use crate::pass::RenderPass;
use crate::pipeline::RenderResources;
use crate::resolver::{LightContext, Resolver};

/// Cameras a frame is rendered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub camera: EntityKey,
    /// Light entity whose camera renders the shadow map. No shadow pass
    /// runs without one.
    pub light: Option<EntityKey>,
}

impl Frame {
    /// The scene's active camera and light, if it has an active camera.
    #[must_use]
    pub fn from_scene(scene: &Scene) -> Option<Self> {
        scene.active_camera.map(|camera| Self {
            camera,
            light: scene.active_light,
        })
    }
}

/// Counters for one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: u32,
    pub draws: usize,
    /// Render caches released because their entity left the scene.
    pub pruned: usize,
}

/// Where a pass draws and whether it clears first.
#[derive(Debug, Clone, Copy)]
struct PassTarget {
    target: Option<TargetHandle>,
    clear: Option<Vec4>,
}

pub struct Renderer<D: RenderDevice> {
    device: D,
    settings: RendererSettings,
    resources: RenderResources,
    cache: PipelineCache,
    journal: RenderJournal,
    events: EventQueue,
    events_tx: Sender<RenderEvent>,
    dof: DofEffect,
    redraw_requests: u32,
}

impl<D: RenderDevice> Renderer<D> {
    pub fn new(mut device: D, settings: RendererSettings) -> Result<Self> {
        let resources = RenderResources::new(&mut device, &settings)?;
        let events = EventQueue::new();
        let events_tx = events.sender();
        log::info!(
            "Renderer ready (shadow map {}, DoF {})",
            settings.shadow_map_size,
            if settings.dof.enabled { "on" } else { "off" }
        );
        Ok(Self {
            device,
            settings,
            resources,
            cache: PipelineCache::new(),
            journal: RenderJournal::new(),
            events,
            events_tx,
            dof: DofEffect::new(),
            redraw_requests: 0,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Applies new settings. Turning DoF off releases its targets.
    ///
    /// A changed background color or shadow map size rebuilds the matching
    /// device object. Resizing the shadow map also drops every cached
    /// pipeline, since receivers sample the old map; they are rebuilt on
    /// the next frame.
    pub fn set_settings(&mut self, settings: RendererSettings) -> Result<()> {
        if settings.background_color != self.settings.background_color {
            self.resources
                .set_background_color(&mut self.device, settings.background_color)?;
            self.settings.background_color = settings.background_color;
        }
        if settings.shadow_map_size != self.settings.shadow_map_size {
            self.resources
                .resize_shadow_map(&mut self.device, settings.shadow_map_size)?;
            self.settings.shadow_map_size = settings.shadow_map_size;
            self.cache.dirty_all_pipelines();
            self.release_dropped();
        }
        if !settings.dof.enabled {
            self.dof.release(&mut self.device);
        }
        self.settings = settings;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn resources(&self) -> &RenderResources {
        &self.resources
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn dof(&self) -> &DofEffect {
        &self.dof
    }

    /// Sender for notifications raised outside the renderer.
    #[must_use]
    pub fn event_sender(&self) -> Sender<RenderEvent> {
        self.events_tx.clone()
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Drops everything cached for `entity` so the next pass rebuilds it.
    /// Editors call this after changing an entity's geometry or material.
    pub fn notify_entity_changed(&mut self, entity: EntityKey) {
        self.cache.invalidate_all(entity);
        self.release_dropped();
    }

    /// Whether a video source produced a frame since the last call.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requests) > 0
    }

    // ── Frame ────────────────────────────────────────────────────────────────

    /// Renders every pass of one frame.
    pub fn render_frame(&mut self, scene: &mut Scene, frame: &Frame) -> Result<FrameStats> {
        self.cache.poll_image_sources();
        self.process_events(scene);
        let pruned = self.cache.prune(scene);
        self.release_dropped();

        let mut stats = FrameStats {
            pruned,
            ..FrameStats::default()
        };

        let Some(camera) = scene.get(frame.camera).and_then(|e| e.camera.as_ref()) else {
            log::warn!("Frame camera {:?} has no camera component", frame.camera);
            return Ok(stats);
        };
        let main_target = camera.target;
        let viewport = camera.viewport;
        let clear = camera.clear_color.unwrap_or(self.settings.clear_color);

        if let Some(light) = frame.light
            && scene.get(light).is_some_and(|e| e.camera.is_some())
        {
            let target = PassTarget {
                target: Some(self.resources.shadow_target()),
                clear: Some(Vec4::ONE),
            };
            stats.draws += self.draw_pass(scene, light, frame.light, RenderPass::Shadow, target)?;
            stats.passes += 1;
        }

        if self.settings.dof.enabled {
            self.dof.set_framebuffer_size(
                &mut self.device,
                &self.resources,
                viewport.width as u32,
                viewport.height as u32,
            )?;
            let depth_target = self.dof.depth_target();
            let color_target = self.dof.color_target();

            let passes = [
                (RenderPass::DofDepth, depth_target, Some(self.settings.dof.depth_clear)),
                (RenderPass::ColorUnblended, color_target, Some(clear)),
                (RenderPass::ColorBlended, color_target, None),
            ];
            for (pass, target, clear) in passes {
                stats.draws +=
                    self.draw_pass(scene, frame.camera, frame.light, pass, PassTarget { target, clear })?;
                stats.passes += 1;
            }

            self.device.begin_target(&TargetFrame {
                target: main_target,
                viewport,
                projection: Mat4::IDENTITY,
                view: Mat4::IDENTITY,
                clear: Some(clear),
            });
            self.dof.draw(&mut self.device);
            self.device.end_target()?;
        } else {
            let passes = [
                (RenderPass::ColorUnblended, Some(clear)),
                (RenderPass::ColorBlended, None),
            ];
            for (pass, clear) in passes {
                let target = PassTarget {
                    target: main_target,
                    clear,
                };
                stats.draws += self.draw_pass(scene, frame.camera, frame.light, pass, target)?;
                stats.passes += 1;
            }
        }

        log::trace!(
            "Frame done: {} passes, {} draws",
            stats.passes,
            stats.draws
        );
        Ok(stats)
    }

    /// Runs one pass of `scene` through `camera` into the camera's own
    /// target, without clearing. The scene's active light provides the
    /// lighting and shadow uniforms. Returns the number of draws issued.
    pub fn run_pass(&mut self, scene: &mut Scene, camera: EntityKey, pass: RenderPass) -> Result<usize> {
        let Some(target) = scene
            .get(camera)
            .and_then(|e| e.camera.as_ref())
            .map(|c| c.target)
        else {
            log::warn!("Entity {camera:?} has no camera component, skipping {} pass", pass.label());
            return Ok(0);
        };
        let target = match pass {
            RenderPass::Shadow => target.or(Some(self.resources.shadow_target())),
            _ => target,
        };
        let light = scene.active_light;
        self.draw_pass(scene, camera, light, pass, PassTarget { target, clear: None })
    }

    fn draw_pass(
        &mut self,
        scene: &mut Scene,
        camera_key: EntityKey,
        light_key: Option<EntityKey>,
        pass: RenderPass,
        target: PassTarget,
    ) -> Result<usize> {
        let camera_world = scene.world_transform(camera_key);
        let Some(camera) = scene.get_mut(camera_key).and_then(|e| e.camera.as_mut()) else {
            return Ok(0);
        };

        let view = if pass == RenderPass::Shadow {
            shadow_view_flip() * camera_world.inverse()
        } else {
            camera_world.inverse()
        };
        camera.set_view_transform(view);

        let viewport = if pass == RenderPass::Shadow && camera.viewport.width <= 0.0 {
            let size = self.settings.shadow_map_size as f32;
            Viewport::new(0.0, 0.0, size, size)
        } else {
            camera.viewport
        };

        let mut params = FlushParams::new(pass);
        params.focal_distance = camera.focal_distance;
        params.depth_of_field = camera.depth_of_field;
        let projection = camera.projection_matrix();

        let scene: &Scene = scene;
        params.light = light_key.and_then(|key| self.light_context(scene, key));

        self.device.begin_target(&TargetFrame {
            target: target.target,
            viewport,
            projection,
            view,
            clear: target.clear,
        });

        if pass == RenderPass::ColorUnblended {
            self.device
                .draw_rectangle(self.resources.background_pipeline(), Rect::FULL);
        }

        // A frame abandoned before flushing leaves stale entries behind.
        self.journal.clear();
        {
            let mut visitor = PassVisitor::new(&mut self.journal, pass, view);
            scene.traverse(&mut visitor);
        }

        let mut resolver = Resolver::new(
            &mut self.device,
            &mut self.cache,
            &self.resources,
            &self.events_tx,
        );
        let draws = self.journal.flush(&mut resolver, scene, &params);

        self.device.end_target()?;
        self.release_dropped();
        Ok(draws)
    }

    fn light_context(&self, scene: &Scene, key: EntityKey) -> Option<LightContext> {
        let entity = scene.get(key)?;
        let light = entity.light?;
        let projection = entity
            .camera
            .as_ref()
            .map_or_else(|| self.settings.shadow_projection.matrix(), |c| c.projection_matrix());
        Some(LightContext {
            light,
            world: scene.world_transform(key),
            projection,
        })
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// Applies every queued notification, including ones raised while
    /// applying earlier ones.
    pub fn process_events(&mut self, scene: &mut Scene) {
        while let Some(event) = self.events.try_recv() {
            match event {
                RenderEvent::ImageReady {
                    entity,
                    role,
                    width,
                    height,
                } => self.image_source_ready(scene, entity, role, width, height),
                RenderEvent::ImageChanged { .. } => self.redraw_requests += 1,
                RenderEvent::Reshaped { entity } => {
                    self.cache.dirty_pipelines(entity);
                    self.cache.dirty_primitive(entity);
                }
                RenderEvent::NineSliceUpdated { entity } => {
                    self.cache.invalidate_all(entity);
                }
            }
        }
        self.release_dropped();
    }

    /// Pipelines sampling the source are rebuilt. A color source also
    /// resizes the geometry it is mapped onto.
    fn image_source_ready(
        &mut self,
        scene: &mut Scene,
        entity: EntityKey,
        role: SourceType,
        width: u32,
        height: u32,
    ) {
        self.cache.dirty_pipelines(entity);
        if role != SourceType::Color {
            return;
        }

        let Some(source) = self.cache.image_source(entity, role) else {
            return;
        };
        let (width, height) = if source.is_video() {
            (VIDEO_LAYOUT_WIDTH, source.height_for_width(VIDEO_LAYOUT_WIDTH))
        } else {
            (width, height)
        };

        let Some(geometry) = scene.get_mut(entity).and_then(|e| e.geometry.as_mut()) else {
            return;
        };
        match geometry {
            Geometry::Shape(shape) => shape.set_texture_size(width, height),
            Geometry::Diamond(diamond) => {
                *diamond = Diamond::new(diamond.size(), width, height, diamond.mask_texture());
            }
            Geometry::PointalismGrid(grid) => {
                let mut resized = PointalismGrid::new(grid.cell_size(), width, height);
                resized.scale = grid.scale;
                resized.z = grid.z;
                resized.lighter = grid.lighter;
                *grid = resized;
            }
            Geometry::NineSlice(_) | Geometry::Model(_) | Geometry::Text(_) => {}
        }
        log::debug!("Color source of {entity:?} ready, laid out at {width}x{height}");
        self.cache.dirty_primitive(entity);
    }

    fn release_dropped(&mut self) {
        for released in self.cache.drain_released() {
            match released {
                Released::Pipeline(pipeline) => self.device.release_pipeline(pipeline),
                Released::Primitive(primitive) => self.device.release_primitive(primitive),
            }
        }
    }
}

impl<D: RenderDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        self.dof.release(&mut self.device);
        self.resources.release(&mut self.device);
    }
}

// ─── Traversal ───────────────────────────────────────────────────────────────

/// Logs every drawable entity of a pass with its accumulated transform.
struct PassVisitor<'a> {
    journal: &'a mut RenderJournal,
    pass: RenderPass,
    view: Mat4,
    stack: Vec<Mat4>,
}

impl<'a> PassVisitor<'a> {
    fn new(journal: &'a mut RenderJournal, pass: RenderPass, view: Mat4) -> Self {
        Self {
            journal,
            pass,
            view,
            stack: Vec::with_capacity(16),
        }
    }
}

impl SceneVisitor for PassVisitor<'_> {
    fn pre_visit(&mut self, key: EntityKey, entity: &Entity, _depth: usize) -> VisitFlow {
        let parent = self.stack.last().copied().unwrap_or(Mat4::IDENTITY);
        let world = parent * entity.transform.matrix();
        self.stack.push(world);

        // Hidden entities still let their children draw.
        if is_drawn_in(entity, self.pass) && entity.geometry.is_some() {
            self.journal.log(key, self.view * world, world);
        }
        VisitFlow::Continue
    }

    fn post_visit(&mut self, _key: EntityKey, _entity: &Entity, _depth: usize) {
        self.stack.pop();
    }
}
