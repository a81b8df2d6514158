// src/installer.rs
// Installer - flattens the module tree into qualified handler maps and wires child state

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use serde_json::Value;

use crate::action_dispatcher::{ActionHandler, HandlerError};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::local_context::{ActionContext, LocalContext};
use crate::module::{ModuleNode, ModulePath, ModuleTree};
use crate::plugins::devtool::DevtoolEvent;
use crate::store_mod::{Store, StoreError, StoreInner};

static NULL_STATE: Value = Value::Null;

/// Mutation bound to its module: receives the root state and resolves the local subtree itself.
pub(crate) type WrappedMutation = Arc<dyn Fn(&mut Value, &Value) -> Result<(), HandlerError> + Send + Sync>;

/// Action bound to its module's context.
pub(crate) type WrappedAction = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Getter bound to its module's local state and getters.
pub(crate) type WrappedGetter = Arc<dyn Fn(&Store) -> Value + Send + Sync>;

/// Flat handler maps, keyed by fully qualified type. Rebuilt in full on every
/// structural change.
#[derive(Default)]
pub(crate) struct Registry {
    pub mutations: HashMap<String, Vec<WrappedMutation>>,
    pub actions: HashMap<String, Vec<WrappedAction>>,
    pub getters: IndexMap<String, WrappedGetter>,
    pub namespaces: HashMap<String, ModulePath>,
}

impl Registry {
    /// Getter keys under `namespace`, with the prefix stripped.
    pub fn local_getter_keys(&self, namespace: &str) -> Vec<String> {
        self.getters
            .keys()
            .filter_map(|key| key.strip_prefix(namespace))
            .map(str::to_string)
            .collect()
    }
}

/// Walks the tree top-down and registers every module's handlers.
pub(crate) struct Installer<'a> {
    store: Weak<StoreInner>,
    tree: &'a ModuleTree,
    diagnostics: &'a Diagnostics,
    registry: Registry,
}

impl<'a> Installer<'a> {
    pub fn new(store: Weak<StoreInner>, tree: &'a ModuleTree, diagnostics: &'a Diagnostics) -> Self {
        Self {
            store,
            tree,
            diagnostics,
            registry: Registry::default(),
        }
    }

    pub fn install_root(mut self) -> Result<Registry, StoreError> {
        let tree = self.tree;
        self.install_module(&ModulePath::root(), tree.root())?;
        Ok(self.registry)
    }

    fn install_module(&mut self, path: &ModulePath, node: &ModuleNode) -> Result<(), StoreError> {
        let namespace = self.tree.get_namespace(path)?;

        if node.namespaced() {
            if self.registry.namespaces.contains_key(&namespace) {
                self.diagnostics.report(Diagnostic::DuplicateNamespace {
                    namespace: namespace.clone(),
                    path: path.to_string(),
                });
            }
            self.registry.namespaces.insert(namespace.clone(), path.clone());
        }

        let local = LocalContext::new(self.store.clone(), namespace.clone(), path.clone());

        for (key, handler) in node.mutations() {
            let local_path = path.clone();
            let handler = handler.clone();
            let wrapped: WrappedMutation = Arc::new(move |root: &mut Value, payload: &Value| {
                let state = nested_state_mut(root, &local_path).ok_or_else(|| HandlerError::MissingState {
                    path: local_path.to_string(),
                })?;
                handler(state, payload)
            });
            self.registry
                .mutations
                .entry(format!("{}{}", namespace, key))
                .or_default()
                .push(wrapped);
        }

        for (key, action) in node.actions() {
            let action_type = if action.root {
                key.clone()
            } else {
                format!("{}{}", namespace, key)
            };
            let wrapped = self.wrap_action(action_type.clone(), action.handler.clone(), local.clone());
            self.registry.actions.entry(action_type).or_default().push(wrapped);
        }

        for (key, getter) in node.getters() {
            let getter_type = format!("{}{}", namespace, key);
            if self.registry.getters.contains_key(&getter_type) {
                self.diagnostics.report(Diagnostic::DuplicateGetter { getter: getter_type });
                continue;
            }
            let local_path = path.clone();
            let local_namespace = namespace.clone();
            let getter = getter.clone();
            let wrapped: WrappedGetter = Arc::new(move |store: &Store| {
                let local_getters = store.local_getters(&local_namespace);
                let root_getters = store.getters();
                let mut value = Value::Null;
                store.inner.reactivity.read(&mut |root_state: &Value| {
                    let local_state = nested_state(root_state, &local_path).unwrap_or(&NULL_STATE);
                    value = getter(local_state, &local_getters, root_state, &root_getters);
                });
                value
            });
            self.registry.getters.insert(getter_type, wrapped);
        }

        for (key, child) in node.children() {
            self.install_module(&path.child(key), child)?;
        }
        Ok(())
    }

    fn wrap_action(
        &self,
        action_type: String,
        handler: Arc<dyn ActionHandler>,
        local: LocalContext,
    ) -> WrappedAction {
        let store = self.store.clone();
        Arc::new(move |payload: Value| -> BoxFuture<'static, Result<Value, HandlerError>> {
            let Some(inner) = store.upgrade() else {
                return Box::pin(future::ready(Err(StoreError::StoreDropped.into())));
            };
            let store = Store { inner };
            let hook = store.devtool_hook();
            let context = ActionContext::new(store, local.clone());
            let handler = handler.clone();
            let action_type = action_type.clone();
            Box::pin(async move {
                let result = handler.handle(context, payload).await;
                if let (Err(error), Some(hook)) = (&result, hook) {
                    hook.emit(DevtoolEvent::Error {
                        action_type,
                        error: error.clone(),
                    });
                }
                result
            })
        })
    }
}

/// A module state waiting to be spliced into its parent's state.
#[derive(Debug, Clone)]
pub(crate) struct StateAttachment {
    pub path: ModulePath,
    pub state: Value,
}

/// Collect the initial state of `node` (unless it is the root) and of all its
/// descendants, parents before children.
pub(crate) fn collect_attachments(path: &ModulePath, node: &ModuleNode, out: &mut Vec<StateAttachment>) {
    if !path.is_root() {
        out.push(StateAttachment {
            path: path.clone(),
            state: node.state().clone(),
        });
    }
    for (key, child) in node.children() {
        collect_attachments(&path.child(key), child, out);
    }
}

/// Splice every attachment into `root` under its parent's state.
pub(crate) fn attach_states(root: &mut Value, attachments: &[StateAttachment], diagnostics: &Diagnostics) {
    for attachment in attachments {
        let Some((parent_path, key)) = attachment.path.split_last() else {
            continue;
        };
        match nested_state_mut(root, &parent_path) {
            Some(Value::Object(parent)) => {
                if parent.contains_key(key) {
                    diagnostics.report(Diagnostic::StateFieldOverridden {
                        field: key.to_string(),
                        path: parent_path.to_string(),
                    });
                }
                parent.insert(key.to_string(), attachment.state.clone());
            }
            _ => {
                tracing::warn!(path = %attachment.path, "parent state is not an object, module state not attached");
            }
        }
    }
}

pub(crate) fn nested_state<'v>(root: &'v Value, path: &ModulePath) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(root, |state, key| state.get(key.as_str()))
}

pub(crate) fn nested_state_mut<'v>(root: &'v mut Value, path: &ModulePath) -> Option<&'v mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |state, key| state.get_mut(key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleConfig;
    use serde_json::json;

    #[test]
    fn test_attachments_are_preorder_and_skip_root() {
        let tree = ModuleTree::new(
            ModuleConfig::new()
                .state(json!({"root": true}))
                .module(
                    "a",
                    ModuleConfig::new()
                        .state(json!({"n": 1}))
                        .module("b", ModuleConfig::new().state(json!({"n": 2}))),
                )
                .module("c", ModuleConfig::new()),
        )
        .unwrap();

        let mut attachments = Vec::new();
        collect_attachments(&ModulePath::root(), tree.root(), &mut attachments);
        let paths: Vec<String> = attachments.iter().map(|a| a.path.to_string()).collect();
        assert_eq!(paths, vec!["a", "a/b", "c"]);

        let diagnostics = Diagnostics::new(true, 16);
        let mut root = tree.root().state().clone();
        attach_states(&mut root, &attachments, &diagnostics);
        assert_eq!(root, json!({"root": true, "a": {"n": 1, "b": {"n": 2}}, "c": {}}));
        assert!(diagnostics.snapshot().is_empty());
    }

    #[test]
    fn test_overridden_field_is_reported() {
        let diagnostics = Diagnostics::new(true, 16);
        let mut root = json!({"cart": 3});
        let attachments = vec![StateAttachment {
            path: "cart".into(),
            state: json!({"items": []}),
        }];
        attach_states(&mut root, &attachments, &diagnostics);

        assert_eq!(root, json!({"cart": {"items": []}}));
        assert_eq!(
            diagnostics.snapshot(),
            vec![Diagnostic::StateFieldOverridden {
                field: "cart".to_string(),
                path: String::new(),
            }]
        );
    }

    #[test]
    fn test_nested_state_lookup() {
        let mut root = json!({"a": {"b": {"count": 1}}});
        let path = ModulePath::from(["a", "b"]);
        assert_eq!(nested_state(&root, &path), Some(&json!({"count": 1})));
        assert!(nested_state(&root, &["a", "x"].into()).is_none());

        if let Some(state) = nested_state_mut(&mut root, &path) {
            state["count"] = json!(2);
        }
        assert_eq!(root["a"]["b"]["count"], json!(2));
    }

    #[test]
    fn test_local_getter_keys_strip_namespace() {
        let mut registry = Registry::default();
        let getter: WrappedGetter = Arc::new(|_| Value::Null);
        registry.getters.insert("total".to_string(), getter.clone());
        registry.getters.insert("cart/count".to_string(), getter.clone());
        registry.getters.insert("cart/items/first".to_string(), getter);

        assert_eq!(registry.local_getter_keys("cart/"), vec!["count", "items/first"]);
        assert_eq!(registry.local_getter_keys("").len(), 3);
    }
}
