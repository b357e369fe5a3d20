//! # Rig
//!
//! Scene traversal and multi-pass rendering for Rig scenes.
//!
//! This crate re-exports the workspace members under one roof:
//!
//! - [`core`]: errors, device handles, matrix helpers and settings;
//! - [`scene`]: the entity/component scene graph;
//! - [`render`]: the per-pass journal, pipeline cache and frame
//!   orchestrator, plus the headless and wgpu backends.
//!
//! ```no_run
//! use rig::prelude::*;
//!
//! # fn main() -> rig::Result<()> {
//! let mut scene = Scene::new();
//! let camera = scene
//!     .build_entity("Camera")
//!     .with_camera(Camera::new(
//!         Projection::Perspective { fov_y: 1.0, aspect: 1.0, near: 0.1, far: 100.0 },
//!         Viewport::new(0.0, 0.0, 256.0, 256.0),
//!     ))
//!     .build();
//! scene.active_camera = Some(camera);
//!
//! let mut renderer = Renderer::new(HeadlessDevice::new(), RendererSettings::default())?;
//! if let Some(frame) = Frame::from_scene(&scene) {
//!     renderer.render_frame(&mut scene, &frame)?;
//! }
//! # Ok(())
//! # }
//! ```

pub use rig_core as core;
pub use rig_render as render;
pub use rig_scene as scene;

pub use rig_core::{RendererSettings, Result, RigError};
pub use rig_render::{Frame, FrameStats, RenderDevice, RenderPass, Renderer};

#[cfg(feature = "wgpu-backend")]
pub use rig_render::backend::WgpuDevice;

pub mod prelude {
    pub use rig_core::{RendererSettings, Result, RigError, TextureHandle};
    pub use rig_render::backend::HeadlessDevice;
    #[cfg(feature = "wgpu-backend")]
    pub use rig_render::backend::WgpuDevice;
    pub use rig_render::{Frame, FrameStats, RenderDevice, RenderPass, Renderer};
    pub use rig_scene::{
        Asset, Camera, Entity, EntityKey, Geometry, Hair, Light, Material, Mesh, Model,
        Projection, Scene, Shape, Viewport,
    };
}
