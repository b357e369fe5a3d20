//! Shader snippets and their registry.
//!
//! Backends cache compiled programs by the list of snippet ids in a
//! pipeline, never by snippet source. Two pipelines built from the same
//! registry entries in the same order therefore share one program, so every
//! pipeline must take its snippets from the one [`Snippets`] registry owned
//! by [`RenderResources`](super::RenderResources).

use std::sync::atomic::{AtomicU16, Ordering};

/// Identity of a registered snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnippetId(u16);

impl SnippetId {
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Shader stage a snippet is spliced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnippetHook {
    /// Runs before the default position transform and may replace it.
    VertexTransform,
    /// Runs after the position is known.
    Vertex,
    /// Runs after layer combining, in order.
    Fragment,
}

/// A registered shader fragment.
///
/// `chunk` names the template file under `shaders/chunks/` holding the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snippet {
    id: SnippetId,
    hook: SnippetHook,
    chunk: &'static str,
}

impl Snippet {
    #[inline]
    #[must_use]
    pub fn id(&self) -> SnippetId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn hook(&self) -> SnippetHook {
        self.hook
    }

    #[inline]
    #[must_use]
    pub fn chunk(&self) -> &'static str {
        self.chunk
    }
}

static NEXT_SNIPPET_ID: AtomicU16 = AtomicU16::new(0);

macro_rules! snippet_registry {
    ($( $(#[$meta:meta])* $field:ident => $hook:ident ),* $(,)?) => {
        /// Every snippet the resolver can add to a pipeline.
        #[derive(Debug, Clone)]
        pub struct Snippets {
            $( $(#[$meta])* pub $field: Snippet, )*
        }

        impl Snippets {
            pub(crate) fn new() -> Self {
                Self {
                    $( $field: Snippet {
                        id: SnippetId(NEXT_SNIPPET_ID.fetch_add(1, Ordering::Relaxed)),
                        hook: SnippetHook::$hook,
                        chunk: stringify!($field),
                    }, )*
                }
            }

            /// All registered snippets, in declaration order.
            #[must_use]
            pub fn all(&self) -> Vec<Snippet> {
                vec![$( self.$field, )*]
            }
        }
    };
}

snippet_registry! {
    // ==== Vertex ====
    /// Keeps the untransformed position for later snippets.
    cache_position => VertexTransform,
    lighting_vertex => Vertex,
    normal_map_vertex => Vertex,
    shadow_mapping_vertex => Vertex,
    pointalism_vertex => VertexTransform,
    pointalism_video => VertexTransform,
    hair_vertex => Vertex,
    /// Blur factor from view-space distance to the focal plane.
    dof_vertex => Vertex,

    // ==== Coverage ====
    alpha_mask => Fragment,
    alpha_mask_video => Fragment,
    blended_discard => Fragment,
    unblended_discard => Fragment,
    pointalism_halo => Fragment,
    pointalism_opaque => Fragment,

    // ==== Shading ====
    unpremultiply => Fragment,
    premultiply => Fragment,
    normal_map_fragment => Fragment,
    normal_map_video => Fragment,
    material_lighting => Fragment,
    simple_lighting => Fragment,
    shadow_mapping_fragment => Fragment,
    hair_fragment => Fragment,

    // ==== Depth of field ====
    dof_diamond => Fragment,
    dof_unshaped => Fragment,
    dof_plain => Fragment,
    /// Mixes the sharp color target with a blurred copy by the depth
    /// target's alpha.
    dof_composite => Fragment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn ids_are_unique_and_stable_per_registry() {
        let snippets = Snippets::new();
        let all = snippets.all();
        let ids: FxHashSet<_> = all.iter().map(Snippet::id).collect();
        assert_eq!(ids.len(), all.len());
        assert_eq!(snippets.clone().cache_position, snippets.cache_position);
    }

    #[test]
    fn separate_registries_never_alias() {
        let a = Snippets::new();
        let b = Snippets::new();
        assert_ne!(a.premultiply.id(), b.premultiply.id());
        assert_eq!(a.premultiply.chunk(), b.premultiply.chunk());
    }
}
