// src/plugins/devtool.rs
// Devtool bridge - forwards store events to an external inspector and supports time travel

use std::sync::Arc;

use serde_json::Value;

use crate::action_dispatcher::{ActionRecord, ActionSubscriber, HandlerError};
use crate::plugins::Plugin;
use crate::store_mod::{MutationRecord, Store};
use crate::subscribers::SubscribeOptions;

/// Events sent to the devtool hook
#[derive(Debug, Clone, PartialEq)]
pub enum DevtoolEvent {
    Init { state: Value },
    Mutation { mutation: MutationRecord, state: Value },
    Action { action: ActionRecord, state: Value },
    Error { action_type: String, error: HandlerError },
}

/// Receiver of devtool events
pub trait DevtoolHook: Send + Sync {
    fn emit(&self, event: DevtoolEvent);
}

/// Attaches a [`DevtoolHook`] to the store.
pub struct DevtoolPlugin {
    hook: Arc<dyn DevtoolHook>,
}

impl DevtoolPlugin {
    pub fn new(hook: Arc<dyn DevtoolHook>) -> Self {
        Self { hook }
    }
}

impl Plugin for DevtoolPlugin {
    fn name(&self) -> &str {
        "devtool"
    }

    fn install(&self, store: &Store) {
        store.set_devtool_hook(self.hook.clone());
        self.hook.emit(DevtoolEvent::Init { state: store.state() });

        let hook = self.hook.clone();
        store.subscribe(
            move |mutation: &MutationRecord, state: &Value| {
                hook.emit(DevtoolEvent::Mutation {
                    mutation: mutation.clone(),
                    state: state.clone(),
                });
            },
            SubscribeOptions::prepend(),
        );

        let hook = self.hook.clone();
        store.subscribe_action(
            ActionSubscriber::from_fn(move |action: &ActionRecord, state: &Value| {
                hook.emit(DevtoolEvent::Action {
                    action: action.clone(),
                    state: state.clone(),
                });
            }),
            SubscribeOptions::prepend(),
        );

        tracing::debug!("devtool hook attached");
    }
}

/// Restore a state recorded by the devtool. No subscriber fires.
pub fn travel_to_state(store: &Store, target: Value) {
    tracing::debug!("devtool travel to state");
    store.replace_state(target);
}
