use bitflags::bitflags;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::components::{Camera, Geometry, Hair, Light, Material};
use crate::transform::Transform;

new_key_type! {
    /// Stable identity of an entity across frames.
    pub struct EntityKey;
}

bitflags! {
    /// Per-entity render flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EntityFlags: u8 {
        const VISIBLE        = 1 << 0;
        const CAST_SHADOW    = 1 << 1;
        const RECEIVE_SHADOW = 1 << 2;
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::CAST_SHADOW
    }
}

/// A scene graph node with its components.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub label: String,
    pub transform: Transform,
    pub flags: EntityFlags,

    // ==== Components ====
    pub geometry: Option<Geometry>,
    pub material: Option<Material>,
    pub camera: Option<Camera>,
    pub light: Option<Light>,
    pub hair: Option<Hair>,

    // ==== Hierarchy (maintained by Scene) ====
    pub(crate) parent: Option<EntityKey>,
    pub(crate) children: SmallVec<[EntityKey; 4]>,
}

impl Entity {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    // ── Flags ────────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn visible(&self) -> bool {
        self.flags.contains(EntityFlags::VISIBLE)
    }

    #[inline]
    #[must_use]
    pub fn cast_shadow(&self) -> bool {
        self.flags.contains(EntityFlags::CAST_SHADOW)
    }

    #[inline]
    #[must_use]
    pub fn receive_shadow(&self) -> bool {
        self.flags.contains(EntityFlags::RECEIVE_SHADOW)
    }

    pub fn set_visible(&mut self, value: bool) {
        self.flags.set(EntityFlags::VISIBLE, value);
    }

    pub fn set_cast_shadow(&mut self, value: bool) {
        self.flags.set(EntityFlags::CAST_SHADOW, value);
    }

    pub fn set_receive_shadow(&mut self, value: bool) {
        self.flags.set(EntityFlags::RECEIVE_SHADOW, value);
    }
}
