//! Notifications from scene objects back to the renderer.
//!
//! Image sources and geometry raise their signals from wherever they are
//! updated (a decoder thread, an editor callback). The subscriptions the
//! renderer installs only forward a [`RenderEvent`] over a channel; the
//! renderer applies them on the render thread at the start of a frame, so
//! the pipeline cache is never touched from a callback.

use flume::{Receiver, Sender};
use rig_scene::{EntityKey, ImageSource, NineSlice, Shape, SourceType, Subscription};
use smallvec::{SmallVec, smallvec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// An image source learned its dimensions.
    ImageReady {
        entity: EntityKey,
        role: SourceType,
        width: u32,
        height: u32,
    },
    /// A video source decoded a new frame.
    ImageChanged { entity: EntityKey },
    /// A shape changed its layout.
    Reshaped { entity: EntityKey },
    /// A nine-slice changed size or borders.
    NineSliceUpdated { entity: EntityKey },
}

/// Unbounded multi-producer queue of [`RenderEvent`]s.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<RenderEvent>,
    rx: Receiver<RenderEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    #[must_use]
    pub fn sender(&self) -> Sender<RenderEvent> {
        self.tx.clone()
    }

    /// Takes every queued event without blocking.
    pub fn drain(&self) -> impl Iterator<Item = RenderEvent> + '_ {
        self.rx.try_iter()
    }

    /// Takes the next queued event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<RenderEvent> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

fn forward(tx: &Sender<RenderEvent>, event: RenderEvent) {
    // The receiver lives as long as the renderer; a send can only fail
    // during teardown.
    if tx.send(event).is_err() {
        log::trace!("Render event dropped: {event:?}");
    }
}

/// Forwards ready and changed notifications of `source`.
#[must_use]
pub fn watch_image_source(
    source: &ImageSource,
    entity: EntityKey,
    role: SourceType,
    tx: &Sender<RenderEvent>,
) -> SmallVec<[Subscription; 2]> {
    let ready_tx = tx.clone();
    let changed_tx = tx.clone();
    smallvec![
        source.add_ready_callback(move |ready| {
            forward(
                &ready_tx,
                RenderEvent::ImageReady {
                    entity,
                    role,
                    width: ready.width,
                    height: ready.height,
                },
            );
        }),
        source.add_changed_callback(move |()| {
            forward(&changed_tx, RenderEvent::ImageChanged { entity });
        }),
    ]
}

#[must_use]
pub fn watch_shape(shape: &Shape, entity: EntityKey, tx: &Sender<RenderEvent>) -> Subscription {
    let tx = tx.clone();
    shape.add_reshaped_callback(move |_| forward(&tx, RenderEvent::Reshaped { entity }))
}

#[must_use]
pub fn watch_nine_slice(
    nine_slice: &NineSlice,
    entity: EntityKey,
    tx: &Sender<RenderEvent>,
) -> Subscription {
    let tx = tx.clone();
    nine_slice.add_update_callback(move |()| forward(&tx, RenderEvent::NineSliceUpdated { entity }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use rig_core::TextureHandle;
    use slotmap::KeyData;

    fn key() -> EntityKey {
        EntityKey::from(KeyData::from_ffi(1))
    }

    #[test]
    fn shape_events_stop_after_subscription_drop() {
        let queue = EventQueue::new();
        let mut shape = Shape::new(Vec2::splat(10.0), false, TextureHandle::from_raw(0));

        let sub = watch_shape(&shape, key(), &queue.sender());
        shape.set_shaped(true);
        drop(sub);
        shape.set_shaped(false);

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(events, vec![RenderEvent::Reshaped { entity: key() }]);
        assert_eq!(queue.pending(), 0);
    }
}
