// src/subscribers.rs
// Subscriber lists - ordered, identity-deduplicated observer lists with disposers

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Options accepted by `subscribe` / `subscribe_action`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Insert at the front of the list instead of the back.
    pub prepend: bool,
}

impl SubscribeOptions {
    pub fn prepend() -> Self {
        Self { prepend: true }
    }
}

fn same_entry<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Ordered list of subscribers. Iteration always happens over a snapshot.
pub struct SubscriberList<T: ?Sized> {
    entries: Arc<Mutex<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Clone for SubscriberList<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> Default for SubscriberList<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> SubscriberList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entry` unless the same `Arc` is already subscribed. The returned
    /// disposer removes exactly this entry.
    pub fn subscribe(&self, entry: Arc<T>, options: SubscribeOptions) -> Disposer {
        {
            let mut entries = self.entries.lock();
            if !entries.iter().any(|existing| same_entry(existing, &entry)) {
                if options.prepend {
                    entries.insert(0, entry.clone());
                } else {
                    entries.push(entry.clone());
                }
            }
        }

        let entries = Arc::downgrade(&self.entries);
        Disposer::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.lock().retain(|existing| !same_entry(existing, &entry));
            }
        })
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for SubscriberList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

/// Handle returned by every subscription. Disposing twice is a no-op.
pub struct Disposer {
    disposed: AtomicBool,
    dispose: Box<dyn Fn() + Send + Sync>,
}

impl Disposer {
    pub fn new<F>(dispose: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            disposed: AtomicBool::new(false),
            dispose: Box::new(dispose),
        }
    }

    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            (self.dispose)();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
