//! Backend-agnostic pipeline description.

use bitflags::bitflags;
use glam::Vec4;
use rig_core::TextureHandle;
use smallvec::SmallVec;

use super::snippet::{Snippet, SnippetHook, SnippetId};

// ─── Layer slots ─────────────────────────────────────────────────────────────

/// Mask or shape silhouette (circle, diamond, shape cut-out).
pub const LAYER_SHAPE: u8 = 0;
/// Albedo from the color image source.
pub const LAYER_COLOR: u8 = 1;
pub const LAYER_ALPHA_MASK: u8 = 4;
pub const LAYER_NORMAL_MAP: u8 = 7;
/// Depth texture of the light's shadow target.
pub const LAYER_SHADOW_MAP: u8 = 10;
/// Shell texture of the hair group being drawn.
pub const LAYER_HAIR: u8 = 11;

/// Every layer index a pipeline may use.
pub const LAYER_SLOTS: [u8; 6] = [
    LAYER_SHAPE,
    LAYER_COLOR,
    LAYER_ALPHA_MASK,
    LAYER_NORMAL_MAP,
    LAYER_SHADOW_MAP,
    LAYER_HAIR,
];

/// How a layer contributes to the fragment color before snippets run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerCombine {
    /// `color *= texel`
    #[default]
    Modulate,
    /// The layer leaves the color untouched; snippets sample it directly.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerDesc {
    pub index: u8,
    pub texture: Option<TextureHandle>,
    pub combine: LayerCombine,
}

// ─── Fixed-function state ────────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const RED   = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE  = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL   = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// `ADD(SRC_COLOR, DST_COLOR * (1 - SRC_ALPHA))`
    #[default]
    Premultiplied,
    /// `ADD(SRC_COLOR, 0)`
    Replace,
}

/// Depth state. As in GL, `write` only takes effect while `test` is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: false,
            write: true,
        }
    }
}

// ─── PipelineDesc ────────────────────────────────────────────────────────────

/// Everything a backend needs to build one pipeline.
///
/// Layers are kept sorted by index. Snippets keep insertion order, which is
/// the order they run in within their hook.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub label: &'static str,
    pub color: Vec4,
    pub layers: SmallVec<[LayerDesc; 6]>,
    pub snippets: SmallVec<[Snippet; 12]>,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub color_mask: ColorMask,
}

impl PipelineDesc {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            color: Vec4::ONE,
            layers: SmallVec::new(),
            snippets: SmallVec::new(),
            blend: BlendMode::default(),
            depth: DepthState::default(),
            color_mask: ColorMask::ALL,
        }
    }

    pub fn add_snippet(&mut self, snippet: Snippet) {
        self.snippets.push(snippet);
    }

    #[must_use]
    pub fn has_snippet(&self, snippet: Snippet) -> bool {
        self.snippets.iter().any(|s| s.id() == snippet.id())
    }

    pub fn snippets_for(&self, hook: SnippetHook) -> impl Iterator<Item = &Snippet> {
        self.snippets.iter().filter(move |s| s.hook() == hook)
    }

    fn layer_mut(&mut self, index: u8) -> &mut LayerDesc {
        let pos = match self.layers.binary_search_by_key(&index, |l| l.index) {
            Ok(pos) => pos,
            Err(pos) => {
                self.layers.insert(
                    pos,
                    LayerDesc {
                        index,
                        texture: None,
                        combine: LayerCombine::default(),
                    },
                );
                pos
            }
        };
        &mut self.layers[pos]
    }

    pub fn set_layer_texture(&mut self, index: u8, texture: TextureHandle) {
        self.layer_mut(index).texture = Some(texture);
    }

    pub fn set_layer_combine(&mut self, index: u8, combine: LayerCombine) {
        self.layer_mut(index).combine = combine;
    }

    #[must_use]
    pub fn layer(&self, index: u8) -> Option<&LayerDesc> {
        self.layers
            .binary_search_by_key(&index, |l| l.index)
            .ok()
            .map(|pos| &self.layers[pos])
    }

    /// Key identifying the compiled program, independent of bound textures.
    #[must_use]
    pub fn program_key(&self) -> ProgramKey {
        ProgramKey {
            snippets: self.snippets.iter().map(Snippet::id).collect(),
            layers: self.layers.iter().map(|l| (l.index, l.combine)).collect(),
            blend: self.blend,
            depth: self.depth,
            color_mask: self.color_mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub snippets: SmallVec<[SnippetId; 12]>,
    pub layers: SmallVec<[(u8, LayerCombine); 6]>,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub color_mask: ColorMask,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::snippet::Snippets;

    #[test]
    fn layers_stay_sorted_and_merge_by_index() {
        let mut desc = PipelineDesc::new("test");
        desc.set_layer_texture(LAYER_HAIR, TextureHandle::from_raw(2));
        desc.set_layer_texture(LAYER_SHAPE, TextureHandle::from_raw(1));
        desc.set_layer_combine(LAYER_HAIR, LayerCombine::Replace);

        let indices: Vec<u8> = desc.layers.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![LAYER_SHAPE, LAYER_HAIR]);
        let hair = desc.layer(LAYER_HAIR).unwrap();
        assert_eq!(hair.texture, Some(TextureHandle::from_raw(2)));
        assert_eq!(hair.combine, LayerCombine::Replace);
    }

    #[test]
    fn program_key_ignores_textures() {
        let snippets = Snippets::new();
        let mut a = PipelineDesc::new("a");
        a.add_snippet(snippets.cache_position);
        a.set_layer_texture(LAYER_COLOR, TextureHandle::from_raw(1));
        let mut b = a.clone();
        b.set_layer_texture(LAYER_COLOR, TextureHandle::from_raw(7));
        assert_eq!(a.program_key(), b.program_key());

        b.add_snippet(snippets.premultiply);
        assert_ne!(a.program_key(), b.program_key());
    }
}
