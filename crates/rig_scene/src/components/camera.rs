use glam::{Mat4, Vec4};
use rig_core::TargetHandle;

/// Projection model of a camera. All matrices use GL clip conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_y, aspect, near, far),
            Self::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }
}

/// Pixel rectangle a camera renders into.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Camera component.
///
/// `target` selects an offscreen render target; `None` renders into the
/// device's main framebuffer. The view transform is written by the frame
/// orchestrator before each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub viewport: Viewport,
    pub target: Option<TargetHandle>,
    pub clear_color: Option<Vec4>,
    /// Distance in front of the camera that is in perfect focus.
    pub focal_distance: f32,
    /// Distance from the focal plane at which blur is total.
    pub depth_of_field: f32,
    view_transform: Mat4,
}

impl Camera {
    #[must_use]
    pub fn new(projection: Projection, viewport: Viewport) -> Self {
        Self {
            projection,
            viewport,
            target: None,
            clear_color: None,
            focal_distance: 30.0,
            depth_of_field: 3.0,
            view_transform: Mat4::IDENTITY,
        }
    }

    #[inline]
    #[must_use]
    pub fn view_transform(&self) -> &Mat4 {
        &self.view_transform
    }

    pub fn set_view_transform(&mut self, view: Mat4) {
        self.view_transform = view;
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }
}
