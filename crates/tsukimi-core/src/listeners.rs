//! Observer set shared by the progress store and the player event bridge.
//!
//! Listeners are identified by their `Arc` allocation: adding the same `Arc`
//! twice registers it once, and removing an unknown listener does nothing.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Slots<T> = Mutex<Vec<Listener<T>>>;

pub struct ListenerSet<T> {
    slots: Arc<Slots<T>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn add(&self, listener: &Listener<T>) -> bool {
        let mut slots = lock(&self.slots);
        if slots.iter().any(|l| Arc::ptr_eq(l, listener)) {
            return false;
        }
        slots.push(Arc::clone(listener));
        true
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove(&self, listener: &Listener<T>) -> bool {
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|l| !Arc::ptr_eq(l, listener));
        slots.len() != before
    }

    /// Register a listener and get a guard that unregisters it on drop.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription<T> {
        self.add(&listener);
        Subscription {
            slots: Arc::downgrade(&self.slots),
            listener: Some(listener),
        }
    }

    /// Deliver `value` to every listener in registration order.
    pub fn emit(&self, value: &T) {
        // Snapshot so listeners may (un)register while being called.
        let snapshot: Vec<Listener<T>> = lock(&self.slots).clone();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposer returned by [`ListenerSet::subscribe`].
pub struct Subscription<T> {
    slots: Weak<Slots<T>>,
    listener: Option<Listener<T>>,
}

impl<T> Subscription<T> {
    /// Unregister now instead of at drop.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let (Some(listener), Some(slots)) = (self.listener.take(), self.slots.upgrade()) else {
            return;
        };
        lock(&slots).retain(|l| !Arc::ptr_eq(l, &listener));
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock<T>(slots: &Slots<T>) -> MutexGuard<'_, Vec<Listener<T>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener<u32>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let listener: Listener<u32> = Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (hits, listener)
    }

    #[test]
    fn test_add_is_idempotent() {
        let set = ListenerSet::new();
        let (hits, listener) = counter();
        assert!(set.add(&listener));
        assert!(!set.add(&listener));
        set.emit(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let (_, listener) = counter();
        assert!(!set.remove(&listener));
        assert!(set.is_empty());
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let set = ListenerSet::new();
        let (hits, listener) = counter();
        let sub = set.subscribe(listener);
        set.emit(&1);
        drop(sub);
        set.emit(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_emit_preserves_registration_order() {
        let set = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let listener: Listener<u32> = Arc::new(move |v| seen.lock().unwrap().push((tag, *v)));
            set.add(&listener);
        }
        set.emit(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }
}
