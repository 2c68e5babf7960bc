//! Subscriber registry with scoped, RAII unsubscription.
//!
//! [`SubscriberSet`] is the fan-out point for state published by the client:
//! registering twice yields two independent entries, and dropping a
//! [`Subscription`] removes exactly that entry. Dispatch clones the callback
//! list out of the lock before invoking anything, so a callback may freely
//! subscribe, unsubscribe or publish again without invalidating the iteration
//! in progress.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// A set of callbacks invoked with every published value.
pub struct SubscriberSet<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Default for SubscriberSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SubscriberSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SubscriberSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback. The returned [`Subscription`] keeps it active;
    /// dropping the subscription deregisters exactly this callback.
    #[must_use = "dropping the subscription immediately unsubscribes the callback"]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, Arc::new(callback)));
        Subscription {
            id,
            set: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every currently registered callback with `value`, in
    /// registration order. The callback list is copied out of the lock first,
    /// so reentrant `subscribe`/`publish` calls are safe; a subscription
    /// dropped mid-dispatch may still receive this value once.
    pub fn publish(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of currently registered callbacks.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        // A poisoned registry only means a callback panicked mid-publish;
        // the entry list itself is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII guard for one registered callback. Dropping it removes exactly that
/// registration; other registrations of the same closure are unaffected.
pub struct Subscription<T> {
    id: u64,
    set: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    /// Keep the callback registered for the lifetime of the set instead of
    /// this guard.
    pub fn detach(mut self) {
        self.set = Weak::new();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.set.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pos) = inner.entries.iter().position(|(id, _)| *id == self.id) {
                inner.entries.remove(pos);
            }
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_all_subscribers() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let _s1 = set.subscribe(move |v| {
            c1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let _s2 = set.subscribe(move |v| {
            c2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        set.publish(&5);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn duplicate_registration_yields_independent_entries() {
        let set: SubscriberSet<()> = SubscriberSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let shared = {
            let count = Arc::clone(&count);
            move |_: &()| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        let s1 = set.subscribe(shared.clone());
        let _s2 = set.subscribe(shared);
        assert_eq!(set.len(), 2);

        set.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Dropping one guard removes exactly one registration.
        drop(s1);
        assert_eq!(set.len(), 1);
        set.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn detach_keeps_callback_alive() {
        let set: SubscriberSet<()> = SubscriberSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

        set.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn drop_after_set_is_gone_is_harmless() {
        let set: SubscriberSet<()> = SubscriberSet::new();
        let sub = set.subscribe(|_| {});
        drop(set);
        drop(sub);
    }

    #[test]
    fn reentrant_subscribe_during_publish_does_not_deadlock() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let inner_set = set.clone();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let _outer = set.subscribe(move |_| {
            // Subscribing from inside a callback must not deadlock or
            // disturb the dispatch in progress.
            let c2 = Arc::clone(&c);
            inner_set
                .subscribe(move |_| {
                    c2.fetch_add(1, Ordering::SeqCst);
                })
                .detach();
        });

        set.publish(&1);
        // The newly added subscriber did not see the value that added it.
        assert_eq!(count.load(Ordering::SeqCst), 0);

        set.publish(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_publish_during_publish_does_not_deadlock() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let inner_set = set.clone();
        let seen = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&seen);
        let _sub = set.subscribe(move |v| {
            s.fetch_add(*v as usize, Ordering::SeqCst);
            if *v == 1 {
                inner_set.publish(&10);
            }
        });

        set.publish(&1);
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }
}
