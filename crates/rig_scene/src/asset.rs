//! Material-referenced image assets.
//!
//! Loading and decoding are done by the host; an [`Asset`] only carries the
//! resulting texture handle or a live [`VideoStream`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rig_core::TextureHandle;

static NEXT_ASSET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique asset identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u64);

impl AssetId {
    fn next() -> Self {
        Self(NEXT_ASSET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A decoded still image already resident on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillImage {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// A live video feed, driven by a decoder outside the renderer.
///
/// Implementations may be updated from a decoder thread.
pub trait VideoStream: Send + Sync {
    /// Frame dimensions, once the first frame has been decoded.
    fn frame_size(&self) -> Option<(u32, u32)>;

    /// Texture holding the most recently decoded frame.
    fn current_frame(&self) -> Option<TextureHandle>;

    /// Monotonic counter bumped for every decoded frame.
    fn frame_serial(&self) -> u64;

    /// Height that keeps the stream's aspect ratio at `width`.
    fn height_for_width(&self, width: u32) -> u32 {
        match self.frame_size() {
            Some((w, h)) if w > 0 => ((u64::from(width) * u64::from(h)) / u64::from(w)) as u32,
            _ => width,
        }
    }
}

#[derive(Clone)]
pub enum AssetKind {
    Texture(StillImage),
    Video(Arc<dyn VideoStream>),
}

impl fmt::Debug for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(image) => f.debug_tuple("Texture").field(image).finish(),
            Self::Video(stream) => f
                .debug_struct("Video")
                .field("frame_size", &stream.frame_size())
                .finish(),
        }
    }
}

/// An image asset referenced by a [`Material`](crate::components::Material).
#[derive(Debug)]
pub struct Asset {
    id: AssetId,
    path: String,
    kind: AssetKind,
}

impl Asset {
    #[must_use]
    pub fn texture(path: impl Into<String>, image: StillImage) -> Arc<Self> {
        Arc::new(Self {
            id: AssetId::next(),
            path: path.into(),
            kind: AssetKind::Texture(image),
        })
    }

    #[must_use]
    pub fn video(path: impl Into<String>, stream: Arc<dyn VideoStream>) -> Arc<Self> {
        Arc::new(Self {
            id: AssetId::next(),
            path: path.into(),
            kind: AssetKind::Video(stream),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> AssetId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &AssetKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self.kind, AssetKind::Video(_))
    }

    /// Still texture, if this is not a video asset.
    #[must_use]
    pub fn still_texture(&self) -> Option<TextureHandle> {
        match &self.kind {
            AssetKind::Texture(image) => Some(image.texture),
            AssetKind::Video(_) => None,
        }
    }
}
