//! Typed observer lists with disposer-style unsubscription.
//!
//! Each event type gets its own [`Listeners<T>`]; there is no untyped dispatch
//! table. Subscribing returns a [`Subscription`] that removes the handler when
//! [`unsubscribe`](Subscription::unsubscribe) is called or when it is dropped.
//!
//! Handlers are invoked synchronously, in subscription order, outside the
//! registry lock, so a handler may subscribe or unsubscribe other handlers
//! (or itself) without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<T>)>>,
}

/// A list of handlers for events of type `T`.
pub struct Listeners<T> {
    registry: Arc<Registry<T>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `handler` and return its disposer.
    #[must_use = "dropping the Subscription unsubscribes the handler"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));

        let weak: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry
                        .handlers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Invoke every registered handler with `event`.
    pub fn emit(&self, event: &T) {
        let handlers: Vec<Handler<T>> = self
            .registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of live handlers.
    pub fn len(&self) -> usize {
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Listeners").field("handlers", &count).finish()
    }
}

/// Disposer returned by a `subscribe`/`on_*` call.
#[must_use = "dropping the Subscription unsubscribes the handler"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.dispose_now();
    }

    /// Keep the handler registered for as long as the event source lives.
    pub fn detach(mut self) {
        self.dispose = None;
    }

    fn dispose_now(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_every_handler_in_order() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = Arc::clone(&seen);
        let _first = listeners.subscribe(move |v| a.lock().unwrap().push(("first", *v)));
        let b = Arc::clone(&seen);
        let _second = listeners.subscribe(move |v| b.lock().unwrap().push(("second", *v)));

        listeners.emit(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let listeners = Listeners::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let keep = listeners.subscribe(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        let gone = listeners.subscribe(move |()| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        gone.unsubscribe();
        listeners.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.len(), 1);
        drop(keep);
        assert!(listeners.is_empty());
    }

    #[test]
    fn detached_subscription_survives_drop() {
        let listeners = Listeners::<()>::new();
        listeners.subscribe(|()| {}).detach();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn disposing_after_source_dropped_is_harmless() {
        let listeners = Listeners::<()>::new();
        let sub = listeners.subscribe(|()| {});
        drop(listeners);
        sub.unsubscribe();
    }

    #[test]
    fn handler_may_subscribe_during_emit() {
        let listeners = Listeners::<()>::new();
        let inner = listeners.clone();
        let spawned = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&spawned);
        let _outer = listeners.subscribe(move |()| {
            store.lock().unwrap().push(inner.subscribe(|()| {}));
        });

        listeners.emit(&());
        assert_eq!(listeners.len(), 2);
    }
}
