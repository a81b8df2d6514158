// src/module/module_tree.rs
// Module Tree - builds and maintains the module hierarchy, resolves paths and namespaces

use std::fmt;

use crate::module::module_mod::{ModuleConfig, ModuleNode};
use crate::store_mod::StoreError;

/// Separator appended after every namespaced module name.
pub const NAMESPACE_SEPARATOR: char = '/';

/// Ordered sequence of module names from the root to a node. The root path is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a direct child of this node.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Split into the parent path and the last segment. `None` for the root.
    pub fn split_last(&self) -> Option<(ModulePath, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((ModulePath(parent.to_vec()), last.as_str()))
    }

    /// Reject empty segments and segments containing the namespace separator.
    pub fn validate(&self) -> Result<(), StoreError> {
        for segment in &self.0 {
            if segment.is_empty() {
                return Err(StoreError::InvalidPath {
                    path: self.to_string(),
                    reason: "module names must not be empty".to_string(),
                });
            }
            if segment.contains(NAMESPACE_SEPARATOR) {
                return Err(StoreError::InvalidPath {
                    path: self.to_string(),
                    reason: format!("module name `{}` contains `{}`", segment, NAMESPACE_SEPARATOR),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for ModulePath {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for ModulePath {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for ModulePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for ModulePath {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ModulePath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&ModulePath> for ModulePath {
    fn from(path: &ModulePath) -> Self {
        path.clone()
    }
}

/// The full module hierarchy, rooted at the store's root module.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    root: ModuleNode,
}

impl ModuleTree {
    /// Build the tree from the root descriptor. Every module declared here is
    /// a non-runtime module and can never be unregistered.
    pub fn new(root: ModuleConfig) -> Result<Self, StoreError> {
        let mut tree = Self {
            root: ModuleNode::new(ModuleConfig::default(), false),
        };
        tree.register(&ModulePath::root(), root, false)?;
        Ok(tree)
    }

    pub fn root(&self) -> &ModuleNode {
        &self.root
    }

    pub fn get(&self, path: &ModulePath) -> Option<&ModuleNode> {
        path.segments()
            .iter()
            .try_fold(&self.root, |module, key| module.get_child(key))
    }

    pub fn get_mut(&mut self, path: &ModulePath) -> Option<&mut ModuleNode> {
        path.segments()
            .iter()
            .try_fold(&mut self.root, |module, key| module.get_child_mut(key))
    }

    /// Concatenate `name/` for every namespaced module on the way from the root to `path`.
    pub fn get_namespace(&self, path: &ModulePath) -> Result<String, StoreError> {
        let mut module = &self.root;
        let mut namespace = String::new();
        for key in path.segments() {
            module = module.get_child(key).ok_or_else(|| StoreError::NotRegistered {
                path: path.to_string(),
            })?;
            if module.namespaced() {
                namespace.push_str(key);
                namespace.push(NAMESPACE_SEPARATOR);
            }
        }
        Ok(namespace)
    }

    /// Register `raw` at `path`, together with every nested module it declares.
    /// The empty path replaces the root.
    pub fn register(&mut self, path: &ModulePath, raw: ModuleConfig, runtime: bool) -> Result<(), StoreError> {
        path.validate()?;
        let node = build_node(path, raw, runtime)?;

        let Some((parent_path, key)) = path.split_last() else {
            self.root = node;
            return Ok(());
        };

        let parent = self
            .get_mut(&parent_path)
            .ok_or_else(|| StoreError::ParentNotRegistered { path: path.to_string() })?;
        if parent.has_child(key) {
            return Err(StoreError::AlreadyRegistered { path: path.to_string() });
        }
        parent.add_child(key, node);
        Ok(())
    }

    /// Remove a runtime module. Declared modules and absent paths are structural errors.
    pub fn unregister(&mut self, path: &ModulePath) -> Result<ModuleNode, StoreError> {
        let (parent_path, key) = path.split_last().ok_or(StoreError::EmptyPath)?;
        let parent = self
            .get_mut(&parent_path)
            .ok_or_else(|| StoreError::NotRegistered { path: path.to_string() })?;
        let child = parent
            .get_child(key)
            .ok_or_else(|| StoreError::NotRegistered { path: path.to_string() })?;
        if !child.runtime() {
            return Err(StoreError::NotRuntimeModule { path: path.to_string() });
        }
        parent
            .remove_child(key)
            .ok_or_else(|| StoreError::NotRegistered { path: path.to_string() })
    }

    /// True iff the parent exists and has a child under the last segment.
    pub fn is_registered(&self, path: &ModulePath) -> bool {
        match path.split_last() {
            Some((parent_path, key)) => self
                .get(&parent_path)
                .map(|parent| parent.has_child(key))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Merge a replacement descriptor over the tree.
    ///
    /// Returns the paths of modules that only exist in the new descriptor; they
    /// are attached as runtime modules. Modules missing from the new descriptor
    /// are left in place. The merge is staged on a copy of the tree, so a
    /// failing update leaves the tree untouched.
    pub fn update(&mut self, raw: &ModuleConfig) -> Result<Vec<ModulePath>, StoreError> {
        let mut staged = self.root.clone();
        let mut added = Vec::new();
        update_node(&mut staged, &ModulePath::root(), raw, &mut added)?;
        self.root = staged;
        Ok(added)
    }
}

fn build_node(path: &ModulePath, mut raw: ModuleConfig, runtime: bool) -> Result<ModuleNode, StoreError> {
    let nested = std::mem::take(&mut raw.modules);
    let mut node = ModuleNode::new(raw, runtime);
    for (key, child) in nested {
        let child_path = path.child(&key);
        child_path.validate()?;
        node.add_child(key, build_node(&child_path, child, runtime)?);
    }
    Ok(node)
}

fn update_node(
    target: &mut ModuleNode,
    path: &ModulePath,
    raw: &ModuleConfig,
    added: &mut Vec<ModulePath>,
) -> Result<(), StoreError> {
    target.update(raw);

    for (key, child_raw) in &raw.modules {
        let child_path = path.child(key);
        match target.get_child_mut(key) {
            Some(child) => update_node(child, &child_path, child_raw, added)?,
            None => {
                child_path.validate()?;
                target.add_child(key.clone(), build_node(&child_path, child_raw.clone(), true)?);
                added.push(child_path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> ModuleTree {
        let root = ModuleConfig::new()
            .state(json!({"count": 0}))
            .module(
                "a",
                ModuleConfig::new()
                    .namespaced(true)
                    .module("b", ModuleConfig::new().namespaced(true))
                    .module("plain", ModuleConfig::new().module("deep", ModuleConfig::new().namespaced(true))),
            );
        ModuleTree::new(root).unwrap()
    }

    #[test]
    fn test_namespace_skips_non_namespaced_ancestors() {
        let tree = sample_tree();

        assert_eq!(tree.get_namespace(&ModulePath::root()).unwrap(), "");
        assert_eq!(tree.get_namespace(&["a"].into()).unwrap(), "a/");
        assert_eq!(tree.get_namespace(&["a", "b"].into()).unwrap(), "a/b/");
        assert_eq!(tree.get_namespace(&["a", "plain"].into()).unwrap(), "a/");
        assert_eq!(tree.get_namespace(&["a", "plain", "deep"].into()).unwrap(), "a/deep/");
    }

    #[test]
    fn test_namespace_of_missing_path_fails() {
        let tree = sample_tree();
        let err = tree.get_namespace(&["a", "missing"].into()).unwrap_err();
        assert_eq!(err, StoreError::NotRegistered { path: "a/missing".to_string() });
    }

    #[test]
    fn test_register_requires_parent() {
        let mut tree = sample_tree();
        let err = tree
            .register(&["x", "y"].into(), ModuleConfig::new(), true)
            .unwrap_err();
        assert_eq!(err, StoreError::ParentNotRegistered { path: "x/y".to_string() });
    }

    #[test]
    fn test_register_rejects_occupied_path() {
        let mut tree = sample_tree();
        let err = tree.register(&"a".into(), ModuleConfig::new(), true).unwrap_err();
        assert_eq!(err, StoreError::AlreadyRegistered { path: "a".to_string() });
    }

    #[test]
    fn test_register_rejects_bad_segments() {
        let mut tree = sample_tree();
        assert!(matches!(
            tree.register(&"a/b".into(), ModuleConfig::new(), true),
            Err(StoreError::InvalidPath { .. })
        ));
        assert!(matches!(
            tree.register(&"".into(), ModuleConfig::new(), true),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_nested_runtime_modules_are_registered() {
        let mut tree = sample_tree();
        tree.register(
            &"cart".into(),
            ModuleConfig::new().module("items", ModuleConfig::new()),
            true,
        )
        .unwrap();

        assert!(tree.is_registered(&["cart", "items"].into()));
        assert!(tree.get(&["cart", "items"].into()).unwrap().runtime());
    }

    #[test]
    fn test_unregister_only_runtime_modules() {
        let mut tree = sample_tree();
        let err = tree.unregister(&"a".into()).unwrap_err();
        assert_eq!(err, StoreError::NotRuntimeModule { path: "a".to_string() });

        let err = tree.unregister(&"ghost".into()).unwrap_err();
        assert_eq!(err, StoreError::NotRegistered { path: "ghost".to_string() });

        tree.register(&"cart".into(), ModuleConfig::new(), true).unwrap();
        tree.unregister(&"cart".into()).unwrap();
        assert!(!tree.is_registered(&"cart".into()));
    }

    #[test]
    fn test_root_is_never_registered_by_path() {
        let tree = sample_tree();
        assert!(!tree.is_registered(&ModulePath::root()));
    }

    #[test]
    fn test_update_is_non_destructive() {
        let mut tree = sample_tree();
        let replacement = ModuleConfig::new()
            .mutation("inc", |_, _| {})
            .module("a", ModuleConfig::new().module("fresh", ModuleConfig::new()));

        let added = tree.update(&replacement).unwrap();

        assert_eq!(added, vec![ModulePath::from(["a", "fresh"])]);
        assert!(tree.get(&["a", "fresh"].into()).unwrap().runtime());
        // `b` is missing from the replacement but stays registered
        assert!(tree.is_registered(&["a", "b"].into()));
        // namespaced flag follows the replacement
        assert!(!tree.get(&"a".into()).unwrap().namespaced());
        assert_eq!(tree.root().mutations().count(), 1);
    }

    #[test]
    fn test_failed_update_leaves_tree_untouched() {
        let mut tree = sample_tree();
        let replacement = ModuleConfig::new()
            .mutation("inc", |_, _| {})
            .module("good", ModuleConfig::new().namespaced(true))
            .module("bad/name", ModuleConfig::new());

        let err = tree.update(&replacement).unwrap_err();

        assert!(matches!(err, StoreError::InvalidPath { .. }));
        assert!(!tree.is_registered(&"good".into()));
        assert_eq!(tree.root().mutations().count(), 0);
        assert!(tree.get(&"a".into()).unwrap().namespaced());
    }

    #[test]
    fn test_path_display_and_split() {
        let path = ModulePath::from(vec!["a", "b", "c"]);
        assert_eq!(path.to_string(), "a/b/c");
        let (parent, last) = path.split_last().unwrap();
        assert_eq!(parent, ModulePath::from(["a", "b"]));
        assert_eq!(last, "c");
        assert!(ModulePath::root().split_last().is_none());
    }
}
