//! Strongly-typed device handles.
//!
//! Thin `Copy` wrappers around a `u64` id handed out by a graphics
//! backend: a plain index for backends with dense storage, or packed
//! index-and-version key data for backends that reuse freed slots. Distinct newtypes prevent mixing up pipelines, textures,
//! primitives and render targets. Handles carry no ownership: whoever stores
//! one is responsible for telling the backend when it is no longer needed.

macro_rules! device_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Human-readable handle kind, used in error messages.
            pub const KIND: &'static str = $kind;

            /// Wraps a raw backend id.
            #[inline]
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw id as an index into dense backend storage.
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

device_handle!(
    /// Handle to a backend pipeline object (program + fixed-function state +
    /// layer textures + uniform values).
    PipelineHandle,
    "pipeline"
);

device_handle!(
    /// Handle to a backend texture.
    TextureHandle,
    "texture"
);

device_handle!(
    /// Handle to an uploaded draw primitive (vertex and index buffers).
    PrimitiveHandle,
    "primitive"
);

device_handle!(
    /// Handle to an offscreen render target (color + depth attachments).
    TargetHandle,
    "target"
);
