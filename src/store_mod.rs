// src/store_mod.rs
// Store - single state tree, commit pipeline, dynamic module registration

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action_dispatcher::{ActionSubscriber, HandlerError};
use crate::config_mod::StoreOptions;
use crate::diagnostics::{Diagnostic, Diagnostics, SubscriberPhase};
use crate::installer::{
    attach_states, collect_attachments, nested_state_mut, Installer, Registry, WrappedAction, WrappedMutation,
};
use crate::local_context::{CallTarget, GettersView, LocalContext};
use crate::module::{ModuleConfig, ModulePath, ModuleTree};
use crate::plugins::devtool::{DevtoolHook, DevtoolPlugin};
use crate::plugins::logger::LoggerPlugin;
use crate::plugins::Plugin;
use crate::reactive_mod::{Evaluator, ObservedState, Reactivity};
use crate::subscribers::{Disposer, SubscribeOptions, SubscriberList};

/// Structural errors. These are programmer errors and always fail the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid module path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Module path must not be empty")]
    EmptyPath,

    #[error("Parent module of '{path}' is not registered")]
    ParentNotRegistered { path: String },

    #[error("A module is already registered at '{path}'")]
    AlreadyRegistered { path: String },

    #[error("No module registered at '{path}'")]
    NotRegistered { path: String },

    #[error("Module '{path}' was declared at construction and cannot be unregistered")]
    NotRuntimeModule { path: String },

    #[error("A reactivity collaborator must be installed before creating a store")]
    ReactivityNotInstalled,

    #[error("Invalid call target: {reason}")]
    InvalidCallTarget { reason: String },

    #[error("Store was dropped")]
    StoreDropped,
}

/// The mutation as seen by subscribers and devtools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub mutation_type: String,
    pub payload: Value,
}

/// `(mutation, state_after)`
pub type MutationSubscriber = dyn Fn(&MutationRecord, &Value) + Send + Sync;

/// Options for `register_module`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Keep whatever state already sits at the module's path.
    pub preserve_state: bool,
}

/// Options for `watch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Invoke the callback once with the current value on registration.
    pub immediate: bool,
}

pub(crate) struct StoreInner {
    pub(crate) reactivity: Arc<dyn Reactivity>,
    options: StoreOptions,
    modules: RwLock<ModuleTree>,
    registry: RwLock<Registry>,
    local_getters_cache: Mutex<HashMap<String, GettersView>>,
    committing: AtomicBool,
    commit_lock: ReentrantMutex<()>,
    subscribers: SubscriberList<MutationSubscriber>,
    pub(crate) action_subscribers: SubscriberList<ActionSubscriber>,
    devtool_hook: RwLock<Option<Arc<dyn DevtoolHook>>>,
    diagnostics: Diagnostics,
    strict_violations: AtomicUsize,
}

/// Shared store handle. Cloning is cheap and every clone sees the same state.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("Store")
            .field("mutations", &registry.mutations.len())
            .field("actions", &registry.actions.len())
            .field("getters", &registry.getters.len())
            .field("subscribers", &self.inner.subscribers.len())
            .field("action_subscribers", &self.inner.action_subscribers.len())
            .field("strict", &self.inner.options.strict)
            .finish()
    }
}

/// Builder for [`Store`]
pub struct StoreBuilder {
    root: ModuleConfig,
    options: StoreOptions,
    reactivity: Option<Arc<dyn Reactivity>>,
    plugins: Vec<Box<dyn Plugin>>,
    devtool_hook: Option<Arc<dyn DevtoolHook>>,
}

impl StoreBuilder {
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Inject the reactivity collaborator. Required.
    pub fn reactivity(mut self, reactivity: Arc<dyn Reactivity>) -> Self {
        self.reactivity = Some(reactivity);
        self
    }

    /// Use the in-crate [`ObservedState`] as the reactivity collaborator.
    pub fn observed_state(self) -> Self {
        self.reactivity(ObservedState::shared())
    }

    /// Plugins are installed in the order they are added.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Devtool hook, attached when `StoreOptions::devtools` is set.
    pub fn devtools(mut self, hook: Arc<dyn DevtoolHook>) -> Self {
        self.devtool_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<Store, StoreError> {
        let reactivity = self.reactivity.ok_or(StoreError::ReactivityNotInstalled)?;
        let tree = ModuleTree::new(self.root)?;
        let diagnostics = Diagnostics::new(self.options.dev_diagnostics, self.options.diagnostics_capacity);

        let mut attachments = Vec::new();
        collect_attachments(&ModulePath::root(), tree.root(), &mut attachments);
        let mut state = tree.root().state().clone();
        attach_states(&mut state, &attachments, &diagnostics);

        let store = Store {
            inner: Arc::new(StoreInner {
                reactivity,
                options: self.options,
                modules: RwLock::new(tree),
                registry: RwLock::new(Registry::default()),
                local_getters_cache: Mutex::new(HashMap::new()),
                committing: AtomicBool::new(false),
                commit_lock: ReentrantMutex::new(()),
                subscribers: SubscriberList::new(),
                action_subscribers: SubscriberList::new(),
                devtool_hook: RwLock::new(None),
                diagnostics,
                strict_violations: AtomicUsize::new(0),
            }),
        };

        store.inner.reactivity.install(state);
        store.reset_registry()?;

        if store.inner.options.strict {
            store.enable_strict_mode();
        }

        for plugin in self.plugins {
            tracing::debug!(plugin = plugin.name(), "installing plugin");
            plugin.install(&store);
        }

        if store.inner.options.devtools {
            match self.devtool_hook {
                Some(hook) => DevtoolPlugin::new(hook).install(&store),
                None => tracing::debug!("devtools enabled but no devtool hook was provided"),
            }
        }

        if let Some(logger) = store.inner.options.logger.clone() {
            LoggerPlugin::new(logger).install(&store);
        }

        tracing::info!(strict = store.inner.options.strict, "store created");
        Ok(store)
    }
}

struct CommittingGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> CommittingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for CommittingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

struct WatcherHold<'a> {
    reactivity: &'a dyn Reactivity,
}

impl<'a> WatcherHold<'a> {
    fn enter(reactivity: &'a dyn Reactivity) -> Self {
        reactivity.hold_watchers();
        Self { reactivity }
    }
}

impl Drop for WatcherHold<'_> {
    fn drop(&mut self) {
        self.reactivity.release_watchers();
    }
}

impl Store {
    pub fn builder(root: ModuleConfig) -> StoreBuilder {
        StoreBuilder {
            root,
            options: StoreOptions::default(),
            reactivity: None,
            plugins: Vec::new(),
            devtool_hook: None,
        }
    }

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> Value {
        self.inner.reactivity.snapshot()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Number of state writes observed outside a commit while strict mode is on.
    pub fn strict_violations(&self) -> usize {
        self.inner.strict_violations.load(Ordering::SeqCst)
    }

    pub fn is_committing(&self) -> bool {
        self.inner.committing.load(Ordering::SeqCst)
    }

    /// Commit a mutation. Unknown types are reported and ignored.
    ///
    /// Handlers run in registration order; the first failing handler stops the
    /// batch and its error is returned without notifying subscribers.
    pub fn commit(&self, target: impl Into<CallTarget>, payload: Value) -> Result<(), HandlerError> {
        let (mutation_type, payload) = target.into().resolve(payload)?;

        let Some(handlers) = self.mutation_handlers(&mutation_type) else {
            self.report(Diagnostic::UnknownMutation { mutation_type });
            return Ok(());
        };

        let mut outcome = Ok(());
        self.with_commit(|| {
            self.inner.reactivity.mutate(&mut |root: &mut Value| {
                outcome = handlers.iter().try_for_each(|handler| handler(root, &payload));
            });
        });
        outcome?;

        let mutation = MutationRecord { mutation_type, payload };
        let subscribers = self.inner.subscribers.snapshot();
        if !subscribers.is_empty() {
            let state = self.state();
            for subscriber in subscribers {
                self.guard_subscriber(SubscriberPhase::Mutation, || subscriber(&mutation, &state));
            }
        }
        Ok(())
    }

    /// Subscribe to committed mutations.
    pub fn subscribe<F>(&self, subscriber: F, options: SubscribeOptions) -> Disposer
    where
        F: Fn(&MutationRecord, &Value) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(subscriber), options)
    }

    /// Subscribe a shared subscriber; subscribing the same `Arc` twice is a no-op.
    pub fn subscribe_shared(&self, subscriber: Arc<MutationSubscriber>, options: SubscribeOptions) -> Disposer {
        self.inner.subscribers.subscribe(subscriber, options)
    }

    /// Watch a value derived from state and getters.
    pub fn watch<S, C>(&self, selector: S, callback: C, options: WatchOptions) -> Disposer
    where
        S: Fn(&Value, &GettersView) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let store = Arc::downgrade(&self.inner);
        let evaluator: Evaluator = Arc::new(move || match store.upgrade() {
            Some(inner) => {
                let store = Store { inner };
                selector(&store.state(), &store.getters())
            }
            None => Value::Null,
        });
        let id = self.inner.reactivity.watch(evaluator, Arc::new(callback), options.immediate);

        let reactivity = Arc::downgrade(&self.inner.reactivity);
        Disposer::new(move || {
            if let Some(reactivity) = reactivity.upgrade() {
                reactivity.unwatch(id);
            }
        })
    }

    /// Swap the whole state tree. Subscribers are not notified.
    pub fn replace_state(&self, state: Value) {
        self.with_commit(|| self.inner.reactivity.install(state));
    }

    /// Register a runtime module, together with its nested modules.
    pub fn register_module(
        &self,
        path: impl Into<ModulePath>,
        config: ModuleConfig,
        options: RegisterOptions,
    ) -> Result<(), StoreError> {
        let path = path.into();
        if path.is_root() {
            return Err(StoreError::EmptyPath);
        }

        let attachments = {
            let mut tree = self.inner.modules.write();
            tree.register(&path, config, true)?;
            let mut attachments = Vec::new();
            if !options.preserve_state {
                if let Some(node) = tree.get(&path) {
                    collect_attachments(&path, node, &mut attachments);
                }
            }
            attachments
        };

        if !attachments.is_empty() {
            self.with_commit(|| {
                self.inner.reactivity.mutate(&mut |root: &mut Value| {
                    attach_states(root, &attachments, &self.inner.diagnostics);
                });
            });
        }

        tracing::info!(path = %path, preserve_state = options.preserve_state, "registered module");
        self.reset_registry()
    }

    /// Remove a runtime module and detach its state from the parent.
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> Result<(), StoreError> {
        let path = path.into();
        let (parent_path, key) = path.split_last().ok_or(StoreError::EmptyPath)?;

        self.inner.modules.write().unregister(&path)?;

        self.with_commit(|| {
            self.inner.reactivity.mutate(&mut |root: &mut Value| {
                if let Some(Value::Object(parent)) = nested_state_mut(root, &parent_path) {
                    parent.remove(key);
                }
            });
        });

        tracing::info!(path = %path, "unregistered module");
        self.reset_registry()
    }

    pub fn has_module(&self, path: impl Into<ModulePath>) -> Result<bool, StoreError> {
        let path = path.into();
        path.validate()?;
        Ok(self.inner.modules.read().is_registered(&path))
    }

    /// Merge a replacement root descriptor over the module tree and reinstall.
    ///
    /// Handler groups are swapped per module; modules missing from `config`
    /// stay registered; modules only present in `config` are added as runtime
    /// modules with fresh state.
    pub fn hot_update(&self, config: ModuleConfig) -> Result<(), StoreError> {
        let attachments = {
            let mut tree = self.inner.modules.write();
            let added = tree.update(&config)?;
            let mut attachments = Vec::new();
            for path in &added {
                tracing::info!(path = %path, "hot update adds new module");
                if let Some(node) = tree.get(path) {
                    collect_attachments(path, node, &mut attachments);
                }
            }
            attachments
        };

        if !attachments.is_empty() {
            self.with_commit(|| {
                self.inner.reactivity.mutate(&mut |root: &mut Value| {
                    attach_states(root, &attachments, &self.inner.diagnostics);
                });
            });
        }

        tracing::info!("hot update applied");
        self.reset_registry()
    }

    /// Root getters view.
    pub fn getters(&self) -> GettersView {
        let keys = self.inner.registry.read().getters.keys().cloned().collect();
        GettersView::new(Arc::downgrade(&self.inner), String::new(), keys)
    }

    /// Evaluate one root getter by its qualified name.
    pub fn getter(&self, name: &str) -> Option<Value> {
        self.inner.reactivity.computed(name)
    }

    /// Local context of the namespaced module registered under `namespace`
    /// (e.g. `"cart/"`).
    pub fn module_context(&self, namespace: &str) -> Option<LocalContext> {
        let path = self.inner.registry.read().namespaces.get(namespace).cloned()?;
        Some(LocalContext::new(
            Arc::downgrade(&self.inner),
            namespace.to_string(),
            path,
        ))
    }

    pub fn has_mutation(&self, mutation_type: &str) -> bool {
        self.inner.registry.read().mutations.contains_key(mutation_type)
    }

    pub fn has_action(&self, action_type: &str) -> bool {
        self.inner.registry.read().actions.contains_key(action_type)
    }

    pub fn devtool_hook(&self) -> Option<Arc<dyn DevtoolHook>> {
        self.inner.devtool_hook.read().clone()
    }

    pub(crate) fn set_devtool_hook(&self, hook: Arc<dyn DevtoolHook>) {
        *self.inner.devtool_hook.write() = Some(hook);
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.inner.diagnostics.report(diagnostic);
    }

    /// Namespace-filtered getters, memoized per namespace until the next reset.
    pub(crate) fn local_getters(&self, namespace: &str) -> GettersView {
        if namespace.is_empty() {
            return self.getters();
        }
        let registry = self.inner.registry.read();
        let mut cache = self.inner.local_getters_cache.lock();
        cache
            .entry(namespace.to_string())
            .or_insert_with(|| {
                GettersView::new(
                    Arc::downgrade(&self.inner),
                    namespace.to_string(),
                    registry.local_getter_keys(namespace),
                )
            })
            .clone()
    }

    pub(crate) fn mutation_handlers(&self, mutation_type: &str) -> Option<Vec<WrappedMutation>> {
        self.inner.registry.read().mutations.get(mutation_type).cloned()
    }

    pub(crate) fn action_handlers(&self, action_type: &str) -> Option<Vec<WrappedAction>> {
        self.inner.registry.read().actions.get(action_type).cloned()
    }

    /// Run `f` inside the committing scope. Nested scopes restore the guard
    /// they found; commits from other threads wait for the scope to close.
    /// Watchers are held until the committing flag has been restored.
    pub(crate) fn with_commit<R>(&self, f: impl FnOnce() -> R) -> R {
        let _lock = self.inner.commit_lock.lock();
        let _watchers = WatcherHold::enter(self.inner.reactivity.as_ref());
        let _guard = CommittingGuard::enter(&self.inner.committing);
        f()
    }

    /// Run a subscriber callback, reporting a panic instead of propagating it.
    pub(crate) fn guard_subscriber(&self, phase: SubscriberPhase, f: impl FnOnce()) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "subscriber panicked".to_string());
            self.report(Diagnostic::SubscriberFault { phase, message });
        }
    }

    /// Rebuild every flat map from the tree and re-register computed getters.
    fn reset_registry(&self) -> Result<(), StoreError> {
        let registry = {
            let tree = self.inner.modules.read();
            Installer::new(Arc::downgrade(&self.inner), &tree, &self.inner.diagnostics).install_root()?
        };

        let reactivity = &self.inner.reactivity;
        reactivity.clear_computed();
        for (key, getter) in &registry.getters {
            let store = Arc::downgrade(&self.inner);
            let getter = getter.clone();
            reactivity.define_computed(
                key,
                Arc::new(move || match store.upgrade() {
                    Some(inner) => getter(&Store { inner }),
                    None => Value::Null,
                }),
            );
        }

        {
            let mut current = self.inner.registry.write();
            *current = registry;
            self.inner.local_getters_cache.lock().clear();
        }

        reactivity.refresh();
        Ok(())
    }

    fn enable_strict_mode(&self) {
        let store = Arc::downgrade(&self.inner);
        self.inner.reactivity.on_mutate(Arc::new(move || {
            let Some(inner) = store.upgrade() else {
                return;
            };
            if !inner.committing.load(Ordering::SeqCst) {
                inner.strict_violations.fetch_add(1, Ordering::SeqCst);
                inner.diagnostics.report(Diagnostic::StrictViolation);
            }
        }));
    }
}
