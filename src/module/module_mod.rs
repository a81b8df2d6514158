// src/module/module_mod.rs
// Module Node - a single node of the module tree and the raw descriptor it is built from

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::action_dispatcher::{ActionHandler, HandlerError};
use crate::local_context::{ActionContext, GettersView};

/// Mutation handler: receives the module's local state and the payload.
pub type MutationFn = Arc<dyn Fn(&mut Value, &Value) -> Result<(), HandlerError> + Send + Sync>;

/// Getter handler: `(local_state, local_getters, root_state, root_getters)`.
pub type GetterFn = Arc<dyn Fn(&Value, &GettersView, &Value, &GettersView) -> Value + Send + Sync>;

/// Zero-argument state factory.
pub type StateFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Initial state of a module: a literal value or a factory invoked once per node.
#[derive(Clone)]
pub enum StateInit {
    Value(Value),
    Factory(StateFactory),
}

impl StateInit {
    /// Produce a fresh state value. A missing (null) state becomes an empty object.
    pub fn instantiate(&self) -> Value {
        let state = match self {
            StateInit::Value(value) => value.clone(),
            StateInit::Factory(factory) => factory(),
        };
        if state.is_null() {
            Value::Object(Default::default())
        } else {
            state
        }
    }
}

impl Default for StateInit {
    fn default() -> Self {
        StateInit::Value(Value::Null)
    }
}

impl fmt::Debug for StateInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateInit::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateInit::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Declared action: the handler and whether it registers in the root namespace.
#[derive(Clone)]
pub struct ActionDef {
    pub handler: Arc<dyn ActionHandler>,
    pub root: bool,
}

/// Raw module descriptor, as supplied by the application.
///
/// Handler groups are `Option`s so a hot update can tell "not provided"
/// (keep the current group) apart from "provided, possibly empty" (replace it).
#[derive(Clone, Default)]
pub struct ModuleConfig {
    pub state: StateInit,
    pub namespaced: bool,
    pub mutations: Option<IndexMap<String, MutationFn>>,
    pub actions: Option<IndexMap<String, ActionDef>>,
    pub getters: Option<IndexMap<String, GetterFn>>,
    pub modules: IndexMap<String, ModuleConfig>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal initial state.
    pub fn state(mut self, state: Value) -> Self {
        self.state = StateInit::Value(state);
        self
    }

    /// Initial state produced by a factory, so re-registering the same
    /// descriptor never shares state between installations.
    pub fn state_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = StateInit::Factory(Arc::new(factory));
        self
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Declare an infallible mutation.
    pub fn mutation<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Value, &Value) + Send + Sync + 'static,
    {
        self.try_mutation(name, move |state: &mut Value, payload: &Value| {
            handler(state, payload);
            Ok(())
        })
    }

    /// Declare a mutation that may fail; a failure stops the remaining
    /// handlers of the same commit and propagates to the caller.
    pub fn try_mutation<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Value, &Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.mutations
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Arc::new(handler));
        self
    }

    /// Declare an asynchronous action from a closure returning a future.
    pub fn action<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.insert_action(name.into(), Arc::new(handler), false)
    }

    /// Declare an action registered under its bare name, ignoring the namespace.
    pub fn root_action<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.insert_action(name.into(), Arc::new(handler), true)
    }

    /// Declare a synchronous action. Its result is wrapped in a ready future.
    pub fn action_sync<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.action(name, move |context: ActionContext, payload: Value| {
            futures::future::ready(handler(context, payload))
        })
    }

    /// Declare an action backed by an [`ActionHandler`] implementation.
    pub fn action_handler<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: ActionHandler + 'static,
    {
        self.insert_action(name.into(), Arc::new(handler), false)
    }

    /// Root-namespace variant of [`ModuleConfig::action_handler`].
    pub fn root_action_handler<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: ActionHandler + 'static,
    {
        self.insert_action(name.into(), Arc::new(handler), true)
    }

    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Value, &GettersView, &Value, &GettersView) -> Value + Send + Sync + 'static,
    {
        self.getters
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Arc::new(getter));
        self
    }

    /// Nest a child module descriptor.
    pub fn module(mut self, name: impl Into<String>, module: ModuleConfig) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    fn insert_action(mut self, name: String, handler: Arc<dyn ActionHandler>, root: bool) -> Self {
        self.actions
            .get_or_insert_with(IndexMap::new)
            .insert(name, ActionDef { handler, root });
        self
    }
}

fn group_keys<V>(group: &Option<IndexMap<String, V>>) -> Vec<&str> {
    group
        .as_ref()
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

impl fmt::Debug for ModuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleConfig")
            .field("state", &self.state)
            .field("namespaced", &self.namespaced)
            .field("mutations", &group_keys(&self.mutations))
            .field("actions", &group_keys(&self.actions))
            .field("getters", &group_keys(&self.getters))
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A node of the module tree.
#[derive(Clone)]
pub struct ModuleNode {
    raw: ModuleConfig,
    state: Value,
    children: IndexMap<String, ModuleNode>,
    runtime: bool,
}

impl ModuleNode {
    /// Build a single node (children are attached by the tree).
    pub fn new(raw: ModuleConfig, runtime: bool) -> Self {
        let state = raw.state.instantiate();
        Self {
            raw,
            state,
            children: IndexMap::new(),
            runtime,
        }
    }

    pub fn namespaced(&self) -> bool {
        self.raw.namespaced
    }

    /// True for modules registered after the store was constructed.
    pub fn runtime(&self) -> bool {
        self.runtime
    }

    /// Initial state produced when the node was built.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn raw(&self) -> &ModuleConfig {
        &self.raw
    }

    pub fn add_child(&mut self, key: impl Into<String>, module: ModuleNode) {
        self.children.insert(key.into(), module);
    }

    pub fn remove_child(&mut self, key: &str) -> Option<ModuleNode> {
        self.children.shift_remove(key)
    }

    pub fn get_child(&self, key: &str) -> Option<&ModuleNode> {
        self.children.get(key)
    }

    pub fn get_child_mut(&mut self, key: &str) -> Option<&mut ModuleNode> {
        self.children.get_mut(key)
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.children.contains_key(key)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &ModuleNode)> {
        self.children.iter()
    }

    /// Replace the namespaced flag and every handler group the new descriptor provides.
    pub fn update(&mut self, raw: &ModuleConfig) {
        self.raw.namespaced = raw.namespaced;
        if let Some(actions) = &raw.actions {
            self.raw.actions = Some(actions.clone());
        }
        if let Some(mutations) = &raw.mutations {
            self.raw.mutations = Some(mutations.clone());
        }
        if let Some(getters) = &raw.getters {
            self.raw.getters = Some(getters.clone());
        }
    }

    pub fn mutations(&self) -> impl Iterator<Item = (&String, &MutationFn)> {
        self.raw.mutations.iter().flat_map(|group| group.iter())
    }

    pub fn actions(&self) -> impl Iterator<Item = (&String, &ActionDef)> {
        self.raw.actions.iter().flat_map(|group| group.iter())
    }

    pub fn getters(&self) -> impl Iterator<Item = (&String, &GetterFn)> {
        self.raw.getters.iter().flat_map(|group| group.iter())
    }
}

impl fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("namespaced", &self.namespaced())
            .field("runtime", &self.runtime)
            .field("state", &self.state)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}
