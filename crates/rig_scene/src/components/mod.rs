//! Components an entity can own, at most one of each kind.

pub mod camera;
pub mod geometry;
pub mod hair;
pub mod light;
pub mod material;

pub use camera::{Camera, Projection, Viewport};
pub use geometry::{
    Diamond, Geometry, GeometryKind, Model, NineSlice, PointalismGrid, Reshaped, Shape, Text,
};
pub use hair::Hair;
pub use light::Light;
pub use material::Material;
