//! Render passes and the cache slots they resolve pipelines into.

/// One traversal of the scene for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    /// Depth from the light's point of view.
    Shadow,
    /// Per-fragment blur factor written to alpha, for the depth-of-field
    /// composite.
    DofDepth,
    /// Fully opaque fragments, front to back with depth writes.
    ColorUnblended,
    /// Translucent fragments, back to front without depth writes.
    ColorBlended,
}

impl RenderPass {
    pub const ALL: [Self; 4] = [
        Self::Shadow,
        Self::DofDepth,
        Self::ColorUnblended,
        Self::ColorBlended,
    ];

    /// Cache slot holding this pass's pipeline. Both mask passes share one.
    #[inline]
    #[must_use]
    pub const fn cache_slot(self) -> CacheSlot {
        match self {
            Self::Shadow | Self::DofDepth => CacheSlot::Shadow,
            Self::ColorUnblended => CacheSlot::ColorUnblended,
            Self::ColorBlended => CacheSlot::ColorBlended,
        }
    }

    /// Mask passes only need coverage and the blur factor, not lighting.
    #[inline]
    #[must_use]
    pub const fn is_mask(self) -> bool {
        matches!(self, Self::Shadow | Self::DofDepth)
    }

    #[inline]
    #[must_use]
    pub const fn is_blended(self) -> bool {
        matches!(self, Self::ColorBlended)
    }

    /// Whether journal entries are replayed in ascending view-space Z.
    ///
    /// View space looks down -Z, so ascending Z is back to front.
    #[inline]
    #[must_use]
    pub const fn back_to_front(self) -> bool {
        matches!(self, Self::ColorBlended)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Shadow => "Shadow",
            Self::DofDepth => "DofDepth",
            Self::ColorUnblended => "ColorUnblended",
            Self::ColorBlended => "ColorBlended",
        }
    }
}

/// Index into an entity's pipeline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    Shadow,
    ColorBlended,
    ColorUnblended,
}

impl CacheSlot {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [Self::Shadow, Self::ColorBlended, Self::ColorUnblended];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Shadow => 0,
            Self::ColorBlended => 1,
            Self::ColorUnblended => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_passes_share_the_shadow_slot() {
        assert_eq!(RenderPass::Shadow.cache_slot(), CacheSlot::Shadow);
        assert_eq!(RenderPass::DofDepth.cache_slot(), CacheSlot::Shadow);
        assert_ne!(
            RenderPass::ColorBlended.cache_slot(),
            RenderPass::ColorUnblended.cache_slot()
        );
    }

    #[test]
    fn only_blended_replays_back_to_front() {
        let back_to_front: Vec<_> = RenderPass::ALL
            .into_iter()
            .filter(|p| p.back_to_front())
            .collect();
        assert_eq!(back_to_front, vec![RenderPass::ColorBlended]);
    }
}
