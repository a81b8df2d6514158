// src/reactive_mod.rs
// Reactivity collaborator - observed state container, lazily cached computed values, watchers
//
// The store core only talks to the `Reactivity` trait. `ObservedState` is the
// in-process implementation used when no UI-side reactive layer is injected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

/// Zero-argument evaluator for computed values and watch selectors.
pub type Evaluator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Synchronous deep hook, run after every write to the container.
pub type MutationHook = Arc<dyn Fn() + Send + Sync>;

/// Watch callback: `(new_value, old_value)`.
pub type WatchCallback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Identifier of a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(Uuid);

impl WatchId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Contract between the store and the reactive layer.
pub trait Reactivity: Send + Sync {
    /// Replace the observed container with one seeded from `state`.
    fn install(&self, state: Value);

    /// Clone of the live state.
    fn snapshot(&self) -> Value;

    /// Borrow the live state without cloning it.
    fn read(&self, f: &mut dyn FnMut(&Value));

    /// Mutate the live state. Hooks run after `f` returns, and so do
    /// watchers unless they are held.
    fn mutate(&self, f: &mut dyn FnMut(&mut Value));

    /// Register a deep, synchronous write hook.
    fn on_mutate(&self, hook: MutationHook);

    /// Register (or replace) a lazily evaluated, cached value under `key`.
    fn define_computed(&self, key: &str, evaluator: Evaluator);

    /// Current value of a computed key, evaluating it if the cache is stale.
    fn computed(&self, key: &str) -> Option<Value>;

    /// Drop every computed definition.
    fn clear_computed(&self);

    /// Invalidate cached values and re-run watchers without a state change.
    fn refresh(&self);

    fn watch(&self, selector: Evaluator, callback: WatchCallback, immediate: bool) -> WatchId;

    fn unwatch(&self, id: WatchId);

    /// Hold watcher callbacks until the matching `release_watchers`. Holds nest.
    fn hold_watchers(&self) {}

    /// Release one hold; pending watchers run once the last hold is released.
    fn release_watchers(&self) {}
}

struct ComputedSlot {
    evaluator: Evaluator,
    cached: Option<Value>,
}

struct Watcher {
    id: WatchId,
    selector: Evaluator,
    callback: WatchCallback,
    last: Mutex<Value>,
}

impl Watcher {
    fn check(&self) {
        let next = (self.selector)();
        let previous = {
            let mut last = self.last.lock();
            if *last == next {
                return;
            }
            std::mem::replace(&mut *last, next.clone())
        };
        (self.callback)(&next, &previous);
    }
}

/// Default in-process reactive container.
#[derive(Default)]
pub struct ObservedState {
    state: RwLock<Value>,
    hooks: Mutex<Vec<MutationHook>>,
    computed: Mutex<HashMap<String, ComputedSlot>>,
    watchers: Mutex<Vec<Arc<Watcher>>>,
    generation: AtomicU64,
    holds: AtomicUsize,
    watchers_pending: AtomicBool,
}

impl ObservedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for slot in self.computed.lock().values_mut() {
            slot.cached = None;
        }
    }

    fn run_watchers(&self) {
        if self.holds.load(Ordering::SeqCst) > 0 {
            self.watchers_pending.store(true, Ordering::SeqCst);
            return;
        }
        let watchers: Vec<Arc<Watcher>> = self.watchers.lock().clone();
        for watcher in watchers {
            watcher.check();
        }
    }

    fn changed(&self) {
        self.invalidate();
        let hooks: Vec<MutationHook> = self.hooks.lock().clone();
        for hook in hooks {
            hook();
        }
        self.run_watchers();
    }
}

impl Reactivity for ObservedState {
    fn install(&self, state: Value) {
        *self.state.write() = state;
        self.changed();
    }

    fn snapshot(&self) -> Value {
        self.state.read().clone()
    }

    fn read(&self, f: &mut dyn FnMut(&Value)) {
        let state = self.state.read_recursive();
        f(&state);
    }

    fn mutate(&self, f: &mut dyn FnMut(&mut Value)) {
        {
            let mut state = self.state.write();
            f(&mut state);
        }
        self.changed();
    }

    fn on_mutate(&self, hook: MutationHook) {
        self.hooks.lock().push(hook);
    }

    fn define_computed(&self, key: &str, evaluator: Evaluator) {
        self.computed.lock().insert(
            key.to_string(),
            ComputedSlot {
                evaluator,
                cached: None,
            },
        );
    }

    fn computed(&self, key: &str) -> Option<Value> {
        let (evaluator, generation) = {
            let slots = self.computed.lock();
            let slot = slots.get(key)?;
            if let Some(value) = &slot.cached {
                return Some(value.clone());
            }
            (slot.evaluator.clone(), self.generation.load(Ordering::SeqCst))
        };

        // evaluated without the lock held: getters read other getters
        let value = evaluator();

        if self.generation.load(Ordering::SeqCst) == generation {
            if let Some(slot) = self.computed.lock().get_mut(key) {
                slot.cached = Some(value.clone());
            }
        }
        Some(value)
    }

    fn clear_computed(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.computed.lock().clear();
    }

    fn refresh(&self) {
        self.invalidate();
        self.run_watchers();
    }

    fn watch(&self, selector: Evaluator, callback: WatchCallback, immediate: bool) -> WatchId {
        let initial = selector();
        if immediate {
            callback(&initial, &Value::Null);
        }
        let watcher = Arc::new(Watcher {
            id: WatchId::new(),
            selector,
            callback,
            last: Mutex::new(initial),
        });
        let id = watcher.id;
        self.watchers.lock().push(watcher);
        id
    }

    fn unwatch(&self, id: WatchId) {
        self.watchers.lock().retain(|watcher| watcher.id != id);
    }

    fn hold_watchers(&self) {
        self.holds.fetch_add(1, Ordering::SeqCst);
    }

    fn release_watchers(&self) {
        let released = self
            .holds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |holds| holds.checked_sub(1))
            .map(|previous| previous == 1)
            .unwrap_or(false);
        if released && self.watchers_pending.swap(false, Ordering::SeqCst) {
            self.run_watchers();
        }
    }
}
