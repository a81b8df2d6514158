//! Library root for the `nodus-store` crate.
//!
//! A single state tree composed of modules. State changes go through
//! synchronous mutations, asynchronous work through actions, and derived
//! values through lazily evaluated getters. The reactive layer is injected
//! through the [`Reactivity`] trait.

pub mod action_dispatcher;
pub mod config_mod;
pub mod diagnostics;
pub mod local_context;
pub mod module;
pub mod plugins;
pub mod reactive_mod;
pub mod store_mod;
pub mod subscribers;

mod installer;

pub use action_dispatcher::{ActionHandler, ActionRecord, ActionSubscriber, HandlerError};
pub use config_mod::{OptionsError, StoreOptions};
pub use diagnostics::{Diagnostic, Diagnostics, SubscriberPhase};
pub use local_context::{ActionContext, CallOptions, CallTarget, GettersView, LocalContext};
pub use module::{ModuleConfig, ModulePath};
pub use plugins::Plugin;
pub use reactive_mod::{ObservedState, Reactivity};
pub use store_mod::{MutationRecord, RegisterOptions, Store, StoreBuilder, StoreError, WatchOptions};
pub use subscribers::{Disposer, SubscribeOptions};
