//! Scene fixtures shared by the Rig renderer's integration tests and tools.

use std::sync::Arc;

use glam::Vec2;
use rig_core::{RendererSettings, Result, TextureHandle};
use rig_render::{Frame, FrameStats, RenderDevice, Renderer};
use rig_scene::{
    Asset, Camera, Entity, EntityKey, Geometry, Hair, Light, Material, Mesh, Model, Projection,
    Scene, Shape, StillImage, Viewport,
};

pub const VIEWPORT_WIDTH: f32 = 640.0;
pub const VIEWPORT_HEIGHT: f32 = 480.0;

/// A scene with a perspective camera at `z = 10` looking down -Z and a light
/// that owns an orthographic shadow camera.
pub struct TestScene {
    pub scene: Scene,
    pub camera: EntityKey,
    pub light: EntityKey,
}

impl Default for TestScene {
    fn default() -> Self {
        Self::new()
    }
}

impl TestScene {
    #[must_use]
    pub fn new() -> Self {
        let mut scene = Scene::new();
        let viewport = Viewport::new(0.0, 0.0, VIEWPORT_WIDTH, VIEWPORT_HEIGHT);

        let camera = scene
            .build_entity("Camera")
            .with_position(0.0, 0.0, 10.0)
            .with_camera(Camera::new(
                Projection::Perspective {
                    fov_y: 60_f32.to_radians(),
                    aspect: VIEWPORT_WIDTH / VIEWPORT_HEIGHT,
                    near: 0.1,
                    far: 100.0,
                },
                viewport,
            ))
            .build();

        let light = scene
            .build_entity("Light")
            .with_position(0.0, 0.0, 20.0)
            .with_light(Light::default())
            .with_camera(Camera::new(
                Projection::Orthographic {
                    left: -20.0,
                    right: 20.0,
                    bottom: -20.0,
                    top: 20.0,
                    near: 1.0,
                    far: 100.0,
                },
                Viewport::new(0.0, 0.0, 0.0, 0.0),
            ))
            .build();

        scene.active_camera = Some(camera);
        scene.active_light = Some(light);

        Self {
            scene,
            camera,
            light,
        }
    }

    #[must_use]
    pub fn frame(&self) -> Frame {
        Frame {
            camera: self.camera,
            light: Some(self.light),
        }
    }

    /// Frame without a shadow pass.
    #[must_use]
    pub fn frame_without_light(&self) -> Frame {
        Frame {
            camera: self.camera,
            light: None,
        }
    }

    /// Renders one frame of this scene through `renderer`.
    pub fn render<D: RenderDevice>(&mut self, renderer: &mut Renderer<D>) -> Result<FrameStats> {
        let frame = self.frame();
        renderer.render_frame(&mut self.scene, &frame)
    }

    pub fn render_without_light<D: RenderDevice>(
        &mut self,
        renderer: &mut Renderer<D>,
    ) -> Result<FrameStats> {
        let frame = self.frame_without_light();
        renderer.render_frame(&mut self.scene, &frame)
    }

    /// Untextured quad at depth `z`.
    pub fn add_model(&mut self, label: &str, z: f32) -> EntityKey {
        self.scene
            .build_entity(label)
            .with_position(0.0, 0.0, z)
            .with_geometry(Geometry::Model(Model::new(Mesh::centered_rectangle(Vec2::ONE))))
            .build()
    }

    /// Shape at depth `z` with `material`.
    pub fn add_shape(
        &mut self,
        label: &str,
        z: f32,
        shaped: bool,
        shape_texture: TextureHandle,
        material: Material,
    ) -> EntityKey {
        self.scene
            .build_entity(label)
            .with_position(0.0, 0.0, z)
            .with_geometry(Geometry::Shape(Shape::new(Vec2::splat(2.0), shaped, shape_texture)))
            .with_material(material)
            .build()
    }

    /// Unit quad carrying `hair`.
    pub fn add_hair(&mut self, label: &str, hair: Hair, material: Material) -> EntityKey {
        self.scene
            .build_entity(label)
            .with_geometry(Geometry::Model(Model::new(Mesh::centered_rectangle(Vec2::ONE))))
            .with_material(material)
            .with_hair(hair)
            .build()
    }

    /// Removes `key` and everything below it.
    pub fn remove(&mut self, key: EntityKey) -> usize {
        self.scene.remove_entity(key)
    }

    #[must_use]
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.scene.get(key)
    }
}

/// Routes `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Solid-color still image uploaded through `device`.
pub fn still_asset<D: RenderDevice + ?Sized>(
    device: &mut D,
    path: &str,
    width: u32,
    height: u32,
    color: [u8; 4],
) -> Result<Arc<Asset>> {
    let pixels: Vec<u8> = color
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 4)
        .collect();
    let texture = device.create_texture_rgba8(path, width, height, &pixels)?;
    Ok(Asset::texture(
        path,
        StillImage {
            texture,
            width,
            height,
        },
    ))
}

/// Material sampling `asset` as its color source.
#[must_use]
pub fn textured_material(asset: Arc<Asset>) -> Material {
    Material::new().with_color_source(asset)
}

/// Settings with depth of field switched on.
#[must_use]
pub fn dof_settings() -> RendererSettings {
    let mut settings = RendererSettings::default();
    settings.dof.enabled = true;
    settings
}
