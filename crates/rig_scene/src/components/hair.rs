use rig_core::TextureHandle;

/// Fur rendered as stacked shells offset along the surface normal.
///
/// `n_shells` shells are drawn in `resolution` groups; every shell in group
/// `i` samples `textures[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hair {
    pub length: f32,
    pub gravity: f32,
    pub resolution: u32,
    pub n_shells: u32,
    pub textures: Vec<TextureHandle>,
}

impl Hair {
    #[must_use]
    pub fn new(length: f32, resolution: u32, n_shells: u32, textures: Vec<TextureHandle>) -> Self {
        Self {
            length,
            gravity: 0.0,
            resolution,
            n_shells,
            textures,
        }
    }

    /// Shells per texture group.
    #[must_use]
    pub fn groups(&self) -> u32 {
        self.n_shells.checked_div(self.resolution).unwrap_or(0)
    }

    #[must_use]
    pub fn texture(&self, group: u32) -> Option<TextureHandle> {
        self.textures.get(group as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_split_shells_evenly() {
        assert_eq!(Hair::new(1.0, 4, 8, Vec::new()).groups(), 2);
        assert_eq!(Hair::new(1.0, 0, 8, Vec::new()).groups(), 0);
    }
}
