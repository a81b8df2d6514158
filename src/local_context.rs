// src/local_context.rs
// Local Context - namespace- and path-scoped views handed to module handlers

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture};
use serde_json::Value;

use crate::action_dispatcher::HandlerError;
use crate::diagnostics::Diagnostic;
use crate::installer::nested_state;
use crate::module::ModulePath;
use crate::store_mod::{Store, StoreError, StoreInner};

/// Target of a commit or dispatch: a bare type, or a descriptor object
/// carrying its own `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Type(String),
    Descriptor(Value),
}

impl CallTarget {
    /// Split into `(type, payload)`. A descriptor is its own payload and the
    /// separately supplied payload is ignored.
    pub fn resolve(self, payload: Value) -> Result<(String, Value), StoreError> {
        match self {
            CallTarget::Type(call_type) => Ok((call_type, payload)),
            CallTarget::Descriptor(descriptor) => {
                let call_type = descriptor
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::InvalidCallTarget {
                        reason: format!("descriptor has no string `type` field: {}", descriptor),
                    })?;
                Ok((call_type, descriptor))
            }
        }
    }
}

impl From<&str> for CallTarget {
    fn from(call_type: &str) -> Self {
        CallTarget::Type(call_type.to_string())
    }
}

impl From<String> for CallTarget {
    fn from(call_type: String) -> Self {
        CallTarget::Type(call_type)
    }
}

impl From<&String> for CallTarget {
    fn from(call_type: &String) -> Self {
        CallTarget::Type(call_type.clone())
    }
}

impl From<Value> for CallTarget {
    fn from(value: Value) -> Self {
        match value {
            Value::String(call_type) => CallTarget::Type(call_type),
            descriptor => CallTarget::Descriptor(descriptor),
        }
    }
}

/// Options for local commit/dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Resolve the type against the root namespace instead of the local one.
    pub root: bool,
}

impl CallOptions {
    pub fn root() -> Self {
        Self { root: true }
    }
}

/// Read-only view over registered getters, optionally filtered to one namespace.
///
/// Names are resolved on every read; nothing is precomputed. For a namespaced
/// view, `get("total")` evaluates the root getter `"<namespace>total"`.
#[derive(Clone)]
pub struct GettersView {
    store: Weak<StoreInner>,
    namespace: String,
    keys: Arc<Vec<String>>,
}

impl GettersView {
    pub(crate) fn new(store: Weak<StoreInner>, namespace: String, keys: Vec<String>) -> Self {
        Self {
            store,
            namespace,
            keys: Arc::new(keys),
        }
    }

    /// A view with no getters, not bound to any store.
    pub fn empty() -> Self {
        Self::new(Weak::new(), String::new(), Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.store.upgrade()?;
        let qualified = format!("{}{}", self.namespace, name);
        inner.reactivity.computed(&qualified)
    }

    /// Local names visible through this view, in registration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.iter().any(|key| key == name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Evaluate every visible getter into an object keyed by local name.
    pub fn to_value(&self) -> Value {
        let values = self
            .keys
            .iter()
            .map(|key| (key.clone(), self.get(key).unwrap_or(Value::Null)))
            .collect();
        Value::Object(values)
    }
}

impl fmt::Debug for GettersView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GettersView")
            .field("namespace", &self.namespace)
            .field("keys", &self.keys)
            .finish()
    }
}

/// Scoped commit/dispatch/state/getters for one module.
#[derive(Clone)]
pub struct LocalContext {
    store: Weak<StoreInner>,
    namespace: String,
    path: ModulePath,
}

impl LocalContext {
    pub(crate) fn new(store: Weak<StoreInner>, namespace: String, path: ModulePath) -> Self {
        Self { store, namespace, path }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    fn store(&self) -> Result<Store, StoreError> {
        self.store
            .upgrade()
            .map(|inner| Store { inner })
            .ok_or(StoreError::StoreDropped)
    }

    pub fn commit(&self, target: impl Into<CallTarget>, payload: Value) -> Result<(), HandlerError> {
        self.commit_with(target, payload, CallOptions::default())
    }

    pub fn commit_with(
        &self,
        target: impl Into<CallTarget>,
        payload: Value,
        options: CallOptions,
    ) -> Result<(), HandlerError> {
        let store = self.store()?;
        if self.namespace.is_empty() {
            return store.commit(target, payload);
        }

        let (local_type, payload) = target.into().resolve(payload)?;
        if options.root {
            return store.commit(local_type, payload);
        }

        let global_type = format!("{}{}", self.namespace, local_type);
        if store.diagnostics().is_enabled() && !store.has_mutation(&global_type) {
            store.report(Diagnostic::UnknownLocalMutation {
                local_type,
                global_type,
            });
            return Ok(());
        }
        store.commit(global_type, payload)
    }

    pub fn dispatch(&self, target: impl Into<CallTarget>, payload: Value) -> BoxFuture<'static, Result<Value, HandlerError>> {
        self.dispatch_with(target, payload, CallOptions::default())
    }

    pub fn dispatch_with(
        &self,
        target: impl Into<CallTarget>,
        payload: Value,
        options: CallOptions,
    ) -> BoxFuture<'static, Result<Value, HandlerError>> {
        let store = match self.store() {
            Ok(store) => store,
            Err(err) => return Box::pin(future::ready(Err(err.into()))),
        };
        if self.namespace.is_empty() {
            return store.dispatch(target, payload);
        }

        let (local_type, payload) = match target.into().resolve(payload) {
            Ok(resolved) => resolved,
            Err(err) => return Box::pin(future::ready(Err(err.into()))),
        };
        if options.root {
            return store.dispatch(local_type, payload);
        }

        let global_type = format!("{}{}", self.namespace, local_type);
        if store.diagnostics().is_enabled() && !store.has_action(&global_type) {
            store.report(Diagnostic::UnknownLocalAction {
                local_type,
                global_type,
            });
            return Box::pin(future::ready(Ok(Value::Null)));
        }
        store.dispatch(global_type, payload)
    }

    /// Current local state: looked up along the path on every call.
    pub fn state(&self) -> Value {
        let Some(inner) = self.store.upgrade() else {
            return Value::Null;
        };
        let mut local = Value::Null;
        inner.reactivity.read(&mut |root: &Value| {
            local = nested_state(root, &self.path).cloned().unwrap_or(Value::Null);
        });
        local
    }

    /// Getters of this module, keyed by local name.
    pub fn getters(&self) -> GettersView {
        match self.store() {
            Ok(store) => store.local_getters(&self.namespace),
            Err(_) => GettersView::empty(),
        }
    }
}

impl fmt::Debug for LocalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalContext")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish()
    }
}

/// Context record passed to every action handler.
#[derive(Clone, Debug)]
pub struct ActionContext {
    store: Store,
    local: LocalContext,
}

impl ActionContext {
    pub(crate) fn new(store: Store, local: LocalContext) -> Self {
        Self { store, local }
    }

    pub fn commit(&self, target: impl Into<CallTarget>, payload: Value) -> Result<(), HandlerError> {
        self.local.commit(target, payload)
    }

    pub fn commit_with(
        &self,
        target: impl Into<CallTarget>,
        payload: Value,
        options: CallOptions,
    ) -> Result<(), HandlerError> {
        self.local.commit_with(target, payload, options)
    }

    pub fn dispatch(&self, target: impl Into<CallTarget>, payload: Value) -> BoxFuture<'static, Result<Value, HandlerError>> {
        self.local.dispatch(target, payload)
    }

    pub fn dispatch_with(
        &self,
        target: impl Into<CallTarget>,
        payload: Value,
        options: CallOptions,
    ) -> BoxFuture<'static, Result<Value, HandlerError>> {
        self.local.dispatch_with(target, payload, options)
    }

    pub fn state(&self) -> Value {
        self.local.state()
    }

    pub fn getters(&self) -> GettersView {
        self.local.getters()
    }

    pub fn root_state(&self) -> Value {
        self.store.state()
    }

    pub fn root_getters(&self) -> GettersView {
        self.store.getters()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn local(&self) -> &LocalContext {
        &self.local
    }
}
