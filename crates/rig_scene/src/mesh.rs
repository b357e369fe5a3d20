//! CPU-side vertex data for drawable geometry.
//!
//! Meshes are produced by geometry components and uploaded once per entity
//! by the renderer's primitive cache.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Interleaved vertex layout shared by every geometry kind.
///
/// `cell_xy` / `cell_st` are only meaningful for pointalism grids, where
/// each quad is one cell: `cell_xy` is the cell centre and `cell_st` the
/// `(s0, s1, t0, t1)` rectangle of the source image the cell averages.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub tex_coord: [f32; 2],
    pub cell_xy: [f32; 2],
    pub cell_st: [f32; 4],
}

impl Vertex {
    #[must_use]
    pub fn flat(x: f32, y: f32, s: f32, t: f32) -> Self {
        Self {
            position: [x, y, 0.0],
            normal: [0.0, 0.0, 1.0],
            tangent: [1.0, 0.0, 0.0],
            tex_coord: [s, t],
            ..Self::default()
        }
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Axis-aligned quad in the XY plane facing +Z, texture `t` growing
    /// downwards.
    #[must_use]
    pub fn rectangle(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let mut mesh = Self::default();
        mesh.push_quad([
            Vertex::flat(x0, y0, 0.0, 1.0),
            Vertex::flat(x1, y0, 1.0, 1.0),
            Vertex::flat(x1, y1, 1.0, 0.0),
            Vertex::flat(x0, y1, 0.0, 0.0),
        ]);
        mesh
    }

    /// Quad of `size` centred on the origin.
    #[must_use]
    pub fn centered_rectangle(size: Vec2) -> Self {
        let half = size * 0.5;
        Self::rectangle(-half.x, -half.y, half.x, half.y)
    }

    /// One quad per `cell_size` square of a `width` x `height` image,
    /// centred on the origin.
    #[must_use]
    pub fn pointalism_grid(cell_size: f32, width: u32, height: u32) -> Self {
        let mut mesh = Self::default();
        if cell_size <= 0.0 || width == 0 || height == 0 {
            return mesh;
        }

        let columns = (width as f32 / cell_size).ceil() as u32;
        let rows = (height as f32 / cell_size).ceil() as u32;
        let half_w = width as f32 * 0.5;
        let half_h = height as f32 * 0.5;
        let half_cell = cell_size * 0.5;

        for row in 0..rows {
            for column in 0..columns {
                let cx = column as f32 * cell_size + half_cell - half_w;
                let cy = half_h - (row as f32 * cell_size + half_cell);

                let s0 = (column as f32 * cell_size) / width as f32;
                let s1 = (((column + 1) as f32 * cell_size) / width as f32).min(1.0);
                let t0 = (row as f32 * cell_size) / height as f32;
                let t1 = (((row + 1) as f32 * cell_size) / height as f32).min(1.0);

                let corner = |x: f32, y: f32, s: f32, t: f32| Vertex {
                    cell_xy: [cx, cy],
                    cell_st: [s0, s1, t0, t1],
                    ..Vertex::flat(x, y, s, t)
                };

                mesh.push_quad([
                    corner(-half_cell, -half_cell, 0.0, 1.0),
                    corner(half_cell, -half_cell, 1.0, 1.0),
                    corner(half_cell, half_cell, 1.0, 0.0),
                    corner(-half_cell, half_cell, 0.0, 0.0),
                ]);
            }
        }
        mesh
    }

    fn push_quad(&mut self, corners: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&corners);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
