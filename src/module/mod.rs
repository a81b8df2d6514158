// src/module/mod.rs
// Module composition: raw descriptors, tree nodes and the module tree

pub mod module_mod;
pub mod module_tree;

// Re-export main types
pub use module_mod::{ActionDef, GetterFn, ModuleConfig, ModuleNode, MutationFn, StateFactory, StateInit};
pub use module_tree::{ModulePath, ModuleTree, NAMESPACE_SEPARATOR};
