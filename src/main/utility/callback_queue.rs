//! Listeners subscribe to an [`EventSource`] and are notified through a [`CallbackQueue`]. The
//! queue defers each notification until the code that emitted it has returned, so a listener that
//! reacts by touching the emitting object (for example by querying a mobility model that just
//! changed course) never observes it half-updated.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use atomic_refcell::AtomicRefCell;

/// A queue of deferred callbacks which, when run, may add more callbacks to the queue.
#[allow(clippy::type_complexity)]
pub struct CallbackQueue(VecDeque<Box<dyn FnOnce(&mut Self)>>);

impl CallbackQueue {
    pub fn new() -> Self {
        Self(VecDeque::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Defer `f` until [`run`](Self::run) is called.
    pub fn add(&mut self, f: impl FnOnce(&mut Self) + 'static) {
        self.0.push_back(Box::new(f));
    }

    /// Run callbacks in FIFO order until the queue is empty, including any that are added while
    /// running.
    pub fn run(&mut self) {
        let mut count: u64 = 0;
        while let Some(f) = self.0.pop_front() {
            (f)(self);

            count += 1;
            if count == 10_000 {
                log::trace!("Possible infinite loop of notification callbacks");
            } else if count == 10_000_000 {
                log::warn!("Very likely an infinite loop of notification callbacks");
            }
        }
    }

    /// Create a queue, let `f` fill it, and drain it before returning `f`'s result.
    pub fn queue_and_run<F, U>(f: F) -> U
    where
        F: FnOnce(&mut Self) -> U,
    {
        let mut cb_queue = Self::new();
        let rv = (f)(&mut cb_queue);
        cb_queue.run();
        rv
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallbackQueue {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        if !self.is_empty() {
            debug_panic!(
                "Dropping CallbackQueue with {} callbacks still pending",
                self.len()
            );
        }
    }
}

type Listener<T> = Arc<dyn Fn(T, &mut CallbackQueue) + Send + Sync>;

struct Listeners<T> {
    by_id: BTreeMap<u64, Listener<T>>,
    next_id: u64,
}

/// Stops listening when dropped.
#[must_use = "Stops listening when the handle is dropped"]
pub struct Handle<T> {
    id: u64,
    source: Weak<AtomicRefCell<Listeners<T>>>,
}

impl<T> Handle<T> {
    /// Stop listening for new events. Equivalent to dropping the handle.
    pub fn stop_listening(self) {}
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(listeners) = self.source.upgrade() {
            listeners.borrow_mut().by_id.remove(&self.id);
        }
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("id", &self.id).finish()
    }
}

/// Emits events of type `T` to subscribed listeners.
pub struct EventSource<T> {
    listeners: Arc<AtomicRefCell<Listeners<T>>>,
}

impl<T: Clone + 'static> EventSource<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(AtomicRefCell::new(Listeners {
                by_id: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Subscribe `notify_fn`. Listeners are notified in subscription order.
    pub fn add_listener(
        &mut self,
        notify_fn: impl Fn(T, &mut CallbackQueue) + Send + Sync + 'static,
    ) -> Handle<T> {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.by_id.insert(id, Arc::new(notify_fn));

        Handle {
            id,
            source: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().by_id.len()
    }

    /// Queue a notification of `message` for every current listener.
    pub fn notify_listeners(&self, message: T, cb_queue: &mut CallbackQueue) {
        for listener in self.listeners.borrow().by_id.values() {
            let listener = Arc::clone(listener);
            let message = message.clone();
            cb_queue.add(move |cb_queue| (listener)(message, cb_queue));
        }
    }
}

impl<T: Clone + 'static> Default for EventSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("listeners", &self.listeners.borrow().by_id.len())
            .finish()
    }
}
