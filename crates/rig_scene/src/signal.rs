//! Revocable callback lists.
//!
//! A [`Signal`] owns a list of callbacks. [`Signal::subscribe`] returns a
//! [`Subscription`] guard; dropping the guard removes the callback. Holders
//! that swap the object they listen to (a renderer re-wiring a replaced
//! geometry, for instance) replace the stored guard and the old callback is
//! gone before the new one is attached.
//!
//! Callbacks run while the slot list is locked: a callback must not
//! subscribe to, unsubscribe from, or emit on the signal that invokes it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

struct SlotList<T> {
    next_id: u64,
    slots: Vec<(u64, Callback<T>)>,
}

/// A list of callbacks invoked by [`Signal::emit`].
///
/// Cloning yields an independent signal with no subscribers, so copying a
/// component never shares its listeners.
pub struct Signal<T> {
    slots: Arc<Mutex<SlotList<T>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Signal<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(SlotList {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }

    /// Invokes every live callback with `value`, in subscription order.
    pub fn emit(&self, value: &T) {
        let mut list = self.slots.lock();
        for (_, callback) in &mut list.slots {
            callback(value);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().slots.len()
    }
}

impl<T: 'static> Signal<T> {
    /// Registers `callback`; it stays registered until the returned guard is
    /// dropped.
    #[must_use = "dropping the subscription immediately removes the callback"]
    pub fn subscribe(&self, callback: impl FnMut(&T) + Send + 'static) -> Subscription {
        let id = {
            let mut list = self.slots.lock();
            let id = list.next_id;
            list.next_id += 1;
            list.slots.push((id, Box::new(callback)));
            id
        };

        let weak: Weak<Mutex<SlotList<T>>> = Arc::downgrade(&self.slots);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots.lock().slots.retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }
}

/// Guard returned by [`Signal::subscribe`]. Dropping it deregisters the
/// callback; outliving the signal is harmless.
#[must_use = "dropping the subscription immediately removes the callback"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Deregisters now. Equivalent to dropping the guard.
    pub fn cancel(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drop_deregisters() {
        let signal = Signal::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let sub = signal.subscribe(move |v| {
            h.fetch_add(*v as usize, Ordering::Relaxed);
        });
        signal.emit(&2);
        drop(sub);
        signal.emit(&5);

        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn replacing_a_guard_leaves_one_callback() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let mut slot: Option<Subscription> = None;
        for _ in 0..3 {
            let h = hits.clone();
            slot = Some(signal.subscribe(move |()| {
                h.fetch_add(1, Ordering::Relaxed);
            }));
        }
        signal.emit(&());

        assert!(slot.is_some());
        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn subscription_outlives_signal() {
        let signal = Signal::<()>::new();
        let sub = signal.subscribe(|()| {});
        drop(signal);
        sub.cancel();
    }

    #[test]
    fn clone_has_no_subscribers() {
        let signal = Signal::<()>::new();
        let _sub = signal.subscribe(|()| {});
        assert_eq!(signal.clone().subscriber_count(), 0);
    }
}
