//! Drawable geometry variants.
//!
//! Geometry is a closed set. The renderer resolves each variant's masking
//! and shading treatment with an exhaustive `match`, so adding a variant is
//! a compile error everywhere a treatment must be chosen.

use glam::{Vec2, Vec4};
use rig_core::TextureHandle;

use crate::mesh::Mesh;
use crate::signal::{Signal, Subscription};

/// Geometry component of an entity.
#[derive(Debug, Clone)]
pub enum Geometry {
    Shape(Shape),
    Diamond(Diamond),
    NineSlice(NineSlice),
    PointalismGrid(PointalismGrid),
    Model(Model),
    Text(Text),
}

/// Field-less mirror of [`Geometry`], for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Shape,
    Diamond,
    NineSlice,
    PointalismGrid,
    Model,
    Text,
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Shape(_) => GeometryKind::Shape,
            Self::Diamond(_) => GeometryKind::Diamond,
            Self::NineSlice(_) => GeometryKind::NineSlice,
            Self::PointalismGrid(_) => GeometryKind::PointalismGrid,
            Self::Model(_) => GeometryKind::Model,
            Self::Text(_) => GeometryKind::Text,
        }
    }

    /// Triangle data for geometry drawn through a cached primitive. Text
    /// paints itself and has none.
    #[must_use]
    pub fn mesh(&self) -> Option<&Mesh> {
        match self {
            Self::Shape(shape) => Some(&shape.mesh),
            Self::Diamond(diamond) => Some(&diamond.mesh),
            Self::NineSlice(nine_slice) => Some(&nine_slice.mesh),
            Self::PointalismGrid(grid) => Some(&grid.mesh),
            Self::Model(model) => Some(&model.mesh),
            Self::Text(_) => None,
        }
    }
}

// ─── Shape ───────────────────────────────────────────────────────────────────

/// Passed to reshaped callbacks after the shape's layout changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reshaped;

/// A textured rectangle, optionally cut out by a circular mask texture.
#[derive(Debug, Clone)]
pub struct Shape {
    size: Vec2,
    shaped: bool,
    shape_texture: TextureHandle,
    texture_size: (u32, u32),
    mesh: Mesh,
    reshaped: Signal<Reshaped>,
}

impl Shape {
    #[must_use]
    pub fn new(size: Vec2, shaped: bool, shape_texture: TextureHandle) -> Self {
        Self {
            size,
            shaped,
            shape_texture,
            texture_size: (size.x as u32, size.y as u32),
            mesh: Mesh::centered_rectangle(size),
            reshaped: Signal::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn shaped(&self) -> bool {
        self.shaped
    }

    pub fn set_shaped(&mut self, shaped: bool) {
        if self.shaped != shaped {
            self.shaped = shaped;
            self.reshaped.emit(&Reshaped);
        }
    }

    #[inline]
    #[must_use]
    pub fn shape_texture(&self) -> TextureHandle {
        self.shape_texture
    }

    #[inline]
    #[must_use]
    pub fn texture_size(&self) -> (u32, u32) {
        self.texture_size
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Fits the quad to the aspect ratio of the image mapped onto it.
    pub fn set_texture_size(&mut self, width: u32, height: u32) {
        if self.texture_size == (width, height) || width == 0 || height == 0 {
            return;
        }
        self.texture_size = (width, height);

        let aspect = width as f32 / height as f32;
        let fitted = if aspect >= self.size.x / self.size.y {
            Vec2::new(self.size.x, self.size.x / aspect)
        } else {
            Vec2::new(self.size.y * aspect, self.size.y)
        };
        self.mesh = Mesh::centered_rectangle(fitted);
        self.reshaped.emit(&Reshaped);
    }

    pub fn add_reshaped_callback(&self, callback: impl FnMut(&Reshaped) + Send + 'static) -> Subscription {
        self.reshaped.subscribe(callback)
    }
}

// ─── Diamond ─────────────────────────────────────────────────────────────────

/// A square tile whose corners are cut by a mask texture.
#[derive(Debug, Clone)]
pub struct Diamond {
    size: f32,
    image_size: (u32, u32),
    mask_texture: TextureHandle,
    mesh: Mesh,
}

impl Diamond {
    #[must_use]
    pub fn new(size: f32, image_width: u32, image_height: u32, mask_texture: TextureHandle) -> Self {
        Self {
            size,
            image_size: (image_width, image_height),
            mask_texture,
            mesh: Mesh::centered_rectangle(Vec2::splat(size)),
        }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> f32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    /// Texture bound at layer 0 to carve the diamond silhouette.
    #[inline]
    #[must_use]
    pub fn mask_texture(&self) -> TextureHandle {
        self.mask_texture
    }
}

// ─── NineSlice ───────────────────────────────────────────────────────────────

/// A stretchable frame with fixed-size borders.
#[derive(Debug, Clone)]
pub struct NineSlice {
    texture: Option<TextureHandle>,
    size: Vec2,
    /// left, right, top, bottom border widths
    borders: Vec4,
    mesh: Mesh,
    updated: Signal<()>,
}

impl NineSlice {
    #[must_use]
    pub fn new(texture: Option<TextureHandle>, size: Vec2, borders: Vec4) -> Self {
        Self {
            texture,
            size,
            borders,
            mesh: Mesh::centered_rectangle(size),
            updated: Signal::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn borders(&self) -> Vec4 {
        self.borders
    }

    pub fn set_size(&mut self, size: Vec2) {
        if self.size != size {
            self.size = size;
            self.mesh = Mesh::centered_rectangle(size);
            self.updated.emit(&());
        }
    }

    pub fn set_borders(&mut self, borders: Vec4) {
        if self.borders != borders {
            self.borders = borders;
            self.updated.emit(&());
        }
    }

    pub fn add_update_callback(&self, callback: impl FnMut(&()) + Send + 'static) -> Subscription {
        self.updated.subscribe(callback)
    }
}

// ─── PointalismGrid ──────────────────────────────────────────────────────────

/// A grid of circular cells, each tinted by the average color of the image
/// region below it and displaced by its brightness.
#[derive(Debug, Clone)]
pub struct PointalismGrid {
    cell_size: f32,
    image_size: (u32, u32),
    pub scale: f32,
    pub z: f32,
    /// Brighter cells grow instead of shrinking.
    pub lighter: bool,
    mesh: Mesh,
}

impl PointalismGrid {
    #[must_use]
    pub fn new(cell_size: f32, image_width: u32, image_height: u32) -> Self {
        Self {
            cell_size,
            image_size: (image_width, image_height),
            scale: 1.0,
            z: 0.0,
            lighter: true,
            mesh: Mesh::pointalism_grid(cell_size, image_width, image_height),
        }
    }

    #[inline]
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    #[must_use]
    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }
}

// ─── Model ───────────────────────────────────────────────────────────────────

/// Mesh-based geometry produced by an external loader.
#[derive(Debug, Clone)]
pub struct Model {
    pub mesh: Mesh,
}

impl Model {
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self { mesh }
    }
}

// ─── Text ────────────────────────────────────────────────────────────────────

/// A text label. Painted by the graphics backend's own text routine, and only
/// in the blended color pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    pub font: String,
    pub color: Vec4,
}

impl Text {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: "Sans 12".to_string(),
            color: Vec4::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shape() -> Shape {
        Shape::new(Vec2::new(100.0, 100.0), true, TextureHandle::from_raw(3))
    }

    #[test]
    fn texture_size_fits_aspect_and_reshapes() {
        let mut s = shape();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = s.add_reshaped_callback(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });

        s.set_texture_size(200, 100);
        s.set_texture_size(200, 100);

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        let ys: Vec<f32> = s.mesh.vertices.iter().map(|v| v.position[1]).collect();
        assert!(ys.iter().all(|y| y.abs() <= 25.0 + 1e-4), "got {ys:?}");
    }

    #[test]
    fn text_has_no_mesh() {
        assert!(Geometry::Text(Text::new("hi")).mesh().is_none());
        assert!(Geometry::Shape(shape()).mesh().is_some());
    }

    #[test]
    fn clone_drops_listeners() {
        let s = shape();
        let _sub = s.add_reshaped_callback(|_| {});
        let copy = s.clone();
        assert_eq!(copy.reshaped.subscriber_count(), 0);
    }
}
