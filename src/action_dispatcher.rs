// src/action_dispatcher.rs
// Action Dispatcher - asynchronous action pipeline with before/after/error subscribers

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::diagnostics::{Diagnostic, SubscriberPhase};
use crate::local_context::{ActionContext, CallTarget};
use crate::store_mod::{Store, StoreError};
use crate::subscribers::{Disposer, SubscribeOptions};

/// Errors returned by mutation and action handlers, and by commit/dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("Handler failed: {message}")]
    Failed { message: String },

    #[error("No state at module path '{path}'")]
    MissingState { path: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    /// An action rejecting with a plain reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected { reason: reason.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed { message: message.into() }
    }
}

/// Action handler trait
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action against its module's context
    async fn handle(&self, context: ActionContext, payload: Value) -> Result<Value, HandlerError>;
}

#[async_trait::async_trait]
impl<F, Fut> ActionHandler for F
where
    F: Fn(ActionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, context: ActionContext, payload: Value) -> Result<Value, HandlerError> {
        (self)(context, payload).await
    }
}

/// The action as seen by subscribers and devtools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: Value,
}

/// `(action, state)`
pub type ActionPhaseFn = Arc<dyn Fn(&ActionRecord, &Value) + Send + Sync>;

/// `(action, state, error)`
pub type ActionErrorFn = Arc<dyn Fn(&ActionRecord, &Value, &HandlerError) + Send + Sync>;

/// Action subscriber with optional before/after/error phases.
#[derive(Clone, Default)]
pub struct ActionSubscriber {
    before: Option<ActionPhaseFn>,
    after: Option<ActionPhaseFn>,
    error: Option<ActionErrorFn>,
}

impl ActionSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain function subscriber runs in the before phase.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) + Send + Sync + 'static,
    {
        Self::new().on_before(f)
    }

    pub fn on_before<F>(mut self, f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn on_after<F>(mut self, f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value, &HandlerError) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ActionSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSubscriber")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl Store {
    /// Dispatch an action.
    ///
    /// Before-phase subscribers run synchronously inside this call and every
    /// handler is started on the current Tokio runtime before it returns, so an
    /// action runs to completion even if the returned future is dropped.
    /// After/error subscribers run once all handlers have settled. Outside a
    /// runtime the handlers are driven to completion on the calling thread.
    /// Unknown types resolve to `Value::Null`.
    pub fn dispatch(&self, target: impl Into<CallTarget>, payload: Value) -> BoxFuture<'static, Result<Value, HandlerError>> {
        let (action_type, payload) = match target.into().resolve(payload) {
            Ok(resolved) => resolved,
            Err(err) => return Box::pin(future::ready(Err(err.into()))),
        };
        let action = ActionRecord { action_type, payload };

        let Some(handlers) = self.action_handlers(&action.action_type) else {
            self.report(Diagnostic::UnknownAction {
                action_type: action.action_type,
            });
            return Box::pin(future::ready(Ok(Value::Null)));
        };

        let subscribers = self.inner.action_subscribers.snapshot();
        if subscribers.iter().any(|sub| sub.before.is_some()) {
            let state = self.state();
            for before in subscribers.iter().filter_map(|sub| sub.before.as_ref()) {
                self.guard_subscriber(SubscriberPhase::Before, || before(&action, &state));
            }
        }

        tracing::debug!(action = %action.action_type, handlers = handlers.len(), "dispatching action");

        let pending: Vec<_> = handlers.iter().map(|handler| handler(action.payload.clone())).collect();

        let Ok(runtime) = Handle::try_current() else {
            let results = futures::executor::block_on(future::join_all(pending));
            return Box::pin(future::ready(self.settle_action(&action, results)));
        };

        let running: Vec<JoinHandle<Result<Value, HandlerError>>> =
            pending.into_iter().map(|handler| runtime.spawn(handler)).collect();

        let store = self.clone();
        let settled = runtime.spawn(async move {
            let mut results = Vec::with_capacity(running.len());
            for handle in running {
                results.push(handle.await.unwrap_or_else(|err| Err(HandlerError::failed(err.to_string()))));
            }
            store.settle_action(&action, results)
        });

        Box::pin(async move {
            settled
                .await
                .unwrap_or_else(|err| Err(HandlerError::failed(err.to_string())))
        })
    }

    /// Combine handler results and notify after/error subscribers.
    ///
    /// A single handler yields its own result; several yield an array in
    /// registration order, or the first error in that order.
    fn settle_action(&self, action: &ActionRecord, results: Vec<Result<Value, HandlerError>>) -> Result<Value, HandlerError> {
        let result = if results.len() == 1 {
            results.into_iter().next().unwrap_or(Ok(Value::Null))
        } else {
            results.into_iter().collect::<Result<Vec<_>, _>>().map(Value::Array)
        };

        let subscribers = self.inner.action_subscribers.snapshot();
        match &result {
            Ok(_) => {
                if subscribers.iter().any(|sub| sub.after.is_some()) {
                    let state = self.state();
                    for after in subscribers.iter().filter_map(|sub| sub.after.as_ref()) {
                        self.guard_subscriber(SubscriberPhase::After, || after(action, &state));
                    }
                }
            }
            Err(error) => {
                if subscribers.iter().any(|sub| sub.error.is_some()) {
                    let state = self.state();
                    for on_error in subscribers.iter().filter_map(|sub| sub.error.as_ref()) {
                        self.guard_subscriber(SubscriberPhase::Error, || on_error(action, &state, error));
                    }
                }
            }
        }
        result
    }

    /// Subscribe to dispatched actions.
    pub fn subscribe_action(&self, subscriber: ActionSubscriber, options: SubscribeOptions) -> Disposer {
        self.subscribe_action_shared(Arc::new(subscriber), options)
    }

    /// Subscribe a shared subscriber; subscribing the same `Arc` twice is a no-op.
    pub fn subscribe_action_shared(&self, subscriber: Arc<ActionSubscriber>, options: SubscribeOptions) -> Disposer {
        self.inner.action_subscribers.subscribe(subscriber, options)
    }
}
