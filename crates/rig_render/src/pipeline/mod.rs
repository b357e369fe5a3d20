//! Pipeline descriptions, shader snippets and shared render resources.

pub mod desc;
pub mod resources;
pub mod snippet;

pub use desc::{
    BlendMode, ColorMask, DepthState, LAYER_ALPHA_MASK, LAYER_COLOR, LAYER_HAIR, LAYER_NORMAL_MAP,
    LAYER_SHADOW_MAP, LAYER_SHAPE, LAYER_SLOTS, LayerCombine, LayerDesc, PipelineDesc, ProgramKey,
};
pub use resources::RenderResources;
pub use snippet::{Snippet, SnippetHook, SnippetId, Snippets};
