// src/plugins/mod.rs
// Store plugins - installed once, in order, at the end of store construction

pub mod devtool;
pub mod logger;

use std::fmt;

use crate::store_mod::Store;

pub use devtool::{travel_to_state, DevtoolEvent, DevtoolHook, DevtoolPlugin};
pub use logger::{LogBook, LogEntry, LogKind, LoggerOptions, LoggerPlugin};

/// Store plugin trait
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once with the fully constructed store.
    fn install(&self, store: &Store);
}

/// Plugin backed by a closure.
pub struct FnPlugin<F> {
    name: String,
    install: F,
}

impl<F> FnPlugin<F>
where
    F: Fn(&Store) + Send + Sync,
{
    pub fn new(name: impl Into<String>, install: F) -> Self {
        Self {
            name: name.into(),
            install,
        }
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&Store) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, store: &Store) {
        (self.install)(store)
    }
}

impl<F> fmt::Debug for FnPlugin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin").field("name", &self.name).finish()
    }
}
