//! Entity/component scene graph consumed by the Rig renderer.
//!
//! Entities live in a [`Scene`] keyed by [`EntityKey`]. Each entity carries a
//! transform, render flags and at most one of each component kind.

pub mod asset;
pub mod components;
pub mod entity;
pub mod image_source;
pub mod mesh;
pub mod scene;
pub mod signal;
pub mod transform;

pub use asset::{Asset, AssetId, AssetKind, StillImage, VideoStream};
pub use components::{
    Camera, Diamond, Geometry, GeometryKind, Hair, Light, Material, Model, NineSlice,
    PointalismGrid, Projection, Reshaped, Shape, Text, Viewport,
};
pub use entity::{Entity, EntityFlags, EntityKey};
pub use image_source::{ImageReady, ImageSource, SourceType};
pub use mesh::{Mesh, Vertex};
pub use scene::{EntityBuilder, Scene, SceneVisitor, VisitFlow};
pub use signal::{Signal, Subscription};
pub use transform::Transform;
