//! Image sources: a still texture or a live video feed in one of three
//! material roles.
//!
//! A source becomes *ready* once its dimensions are known. Still images are
//! ready on the first [`ImageSource::poll`]; video sources become ready when
//! the decoder reports its first frame size. Every new video frame after
//! that raises *changed*.

use std::sync::Arc;

use rig_core::TextureHandle;

use crate::asset::{Asset, AssetKind};
use crate::signal::{Signal, Subscription};

/// Semantic role of an image source on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Color,
    AlphaMask,
    NormalMap,
}

impl SourceType {
    pub const ALL: [Self; 3] = [Self::Color, Self::AlphaMask, Self::NormalMap];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Color => 0,
            Self::AlphaMask => 1,
            Self::NormalMap => 2,
        }
    }
}

/// Payload of the ready notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageReady {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct ImageSource {
    asset: Arc<Asset>,
    ready: bool,
    last_frame_serial: u64,
    on_ready: Signal<ImageReady>,
    on_changed: Signal<()>,
}

impl ImageSource {
    #[must_use]
    pub fn new(asset: Arc<Asset>) -> Self {
        Self {
            asset,
            ready: false,
            last_frame_serial: 0,
            on_ready: Signal::new(),
            on_changed: Signal::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn asset(&self) -> &Arc<Asset> {
        &self.asset
    }

    #[inline]
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.asset.is_video()
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Still texture, or the current frame of a video source.
    #[must_use]
    pub fn texture(&self) -> Option<TextureHandle> {
        match self.asset.kind() {
            AssetKind::Texture(image) => Some(image.texture),
            AssetKind::Video(stream) => stream.current_frame(),
        }
    }

    /// Source dimensions, when known.
    #[must_use]
    pub fn size(&self) -> Option<(u32, u32)> {
        match self.asset.kind() {
            AssetKind::Texture(image) => Some((image.width, image.height)),
            AssetKind::Video(stream) => stream.frame_size(),
        }
    }

    /// Height that keeps the source's aspect ratio at `width`.
    #[must_use]
    pub fn height_for_width(&self, width: u32) -> u32 {
        match self.asset.kind() {
            AssetKind::Texture(image) if image.width > 0 => {
                ((u64::from(width) * u64::from(image.height)) / u64::from(image.width)) as u32
            }
            AssetKind::Texture(_) => width,
            AssetKind::Video(stream) => stream.height_for_width(width),
        }
    }

    pub fn add_ready_callback(&self, callback: impl FnMut(&ImageReady) + Send + 'static) -> Subscription {
        self.on_ready.subscribe(callback)
    }

    pub fn add_changed_callback(&self, callback: impl FnMut(&()) + Send + 'static) -> Subscription {
        self.on_changed.subscribe(callback)
    }

    /// Raises ready the first time dimensions become known, and changed for
    /// every video frame decoded since the previous poll.
    pub fn poll(&mut self) {
        if !self.ready
            && let Some((width, height)) = self.size()
        {
            self.ready = true;
            log::debug!("Image source '{}' ready ({width}x{height})", self.asset.path());
            self.on_ready.emit(&ImageReady { width, height });
        }

        if let AssetKind::Video(stream) = self.asset.kind() {
            let serial = stream.frame_serial();
            if serial != self.last_frame_serial {
                self.last_frame_serial = serial;
                self.on_changed.emit(&());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{StillImage, VideoStream};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStream {
        state: Mutex<(Option<(u32, u32)>, u64)>,
    }

    impl VideoStream for FakeStream {
        fn frame_size(&self) -> Option<(u32, u32)> {
            self.state.lock().0
        }
        fn current_frame(&self) -> Option<TextureHandle> {
            self.state.lock().0.map(|_| TextureHandle::from_raw(9))
        }
        fn frame_serial(&self) -> u64 {
            self.state.lock().1
        }
    }

    #[test]
    fn still_image_is_ready_on_first_poll_only() {
        let asset = Asset::texture(
            "a.png",
            StillImage {
                texture: TextureHandle::from_raw(1),
                width: 64,
                height: 32,
            },
        );
        let mut source = ImageSource::new(asset);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = source.add_ready_callback(move |ready| {
            assert_eq!((ready.width, ready.height), (64, 32));
            h.fetch_add(1, Ordering::Relaxed);
        });

        source.poll();
        source.poll();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(source.height_for_width(640), 320);
    }

    #[test]
    fn video_waits_for_first_frame_then_reports_changes() {
        let stream = Arc::new(FakeStream {
            state: Mutex::new((None, 0)),
        });
        let mut source = ImageSource::new(Asset::video("clip.webm", stream.clone()));
        let changes = Arc::new(AtomicUsize::new(0));
        let c = changes.clone();
        let _sub = source.add_changed_callback(move |()| {
            c.fetch_add(1, Ordering::Relaxed);
        });

        source.poll();
        assert!(!source.is_ready());
        assert!(source.texture().is_none());

        *stream.state.lock() = (Some((1280, 720)), 1);
        source.poll();
        source.poll();
        assert!(source.is_ready());
        assert_eq!(changes.load(Ordering::Relaxed), 1);
        assert_eq!(source.height_for_width(640), 360);
    }
}
