// src/plugins/logger.rs
// Logger plugin - traces mutations with previous/next state and dispatched actions

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action_dispatcher::{ActionRecord, ActionSubscriber};
use crate::plugins::Plugin;
use crate::store_mod::{MutationRecord, Store};
use crate::subscribers::SubscribeOptions;

const LOG_CAPACITY: usize = 256;

/// Logger settings. Filters are type prefixes; an empty filter logs everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    pub log_mutations: bool,
    pub log_actions: bool,
    pub mutation_filter: Vec<String>,
    pub action_filter: Vec<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            log_mutations: true,
            log_actions: true,
            mutation_filter: Vec::new(),
            action_filter: Vec::new(),
        }
    }
}

fn passes(filter: &[String], call_type: &str) -> bool {
    filter.is_empty() || filter.iter().any(|prefix| call_type.starts_with(prefix.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Mutation,
    Action,
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub call_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    /// State before the mutation. `None` for actions.
    pub prev_state: Option<Value>,
    pub next_state: Value,
}

/// Logs every mutation and action through `tracing`, keeping the most recent entries.
pub struct LoggerPlugin {
    options: LoggerOptions,
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LoggerPlugin {
    pub fn new(options: LoggerOptions) -> Self {
        Self {
            options,
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Handle on the retained entries; stays valid after the plugin is installed.
    pub fn entries(&self) -> LogBook {
        LogBook {
            entries: self.entries.clone(),
        }
    }
}

/// Read access to a logger's retained entries.
#[derive(Clone)]
pub struct LogBook {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogBook {
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

fn record(entries: &Mutex<VecDeque<LogEntry>>, entry: LogEntry) {
    let mut entries = entries.lock();
    if entries.len() >= LOG_CAPACITY {
        entries.pop_front();
    }
    entries.push_back(entry);
}

impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        "logger"
    }

    fn install(&self, store: &Store) {
        if self.options.log_mutations {
            let filter = self.options.mutation_filter.clone();
            let entries = self.entries.clone();
            let prev_state = Mutex::new(store.state());
            store.subscribe(
                move |mutation: &MutationRecord, state: &Value| {
                    let next_state = state.clone();
                    let prev = std::mem::replace(&mut *prev_state.lock(), next_state.clone());
                    if !passes(&filter, &mutation.mutation_type) {
                        return;
                    }

                    let timestamp = Utc::now();
                    tracing::info!(
                        target: "nodus_store::logger",
                        mutation = %mutation.mutation_type,
                        payload = %mutation.payload,
                        prev_state = %prev,
                        next_state = %next_state,
                        "mutation @ {}",
                        timestamp.format("%H:%M:%S%.3f")
                    );
                    record(
                        &entries,
                        LogEntry {
                            kind: LogKind::Mutation,
                            call_type: mutation.mutation_type.clone(),
                            payload: mutation.payload.clone(),
                            timestamp,
                            prev_state: Some(prev),
                            next_state,
                        },
                    );
                },
                SubscribeOptions::default(),
            );
        }

        if self.options.log_actions {
            let filter = self.options.action_filter.clone();
            let entries = self.entries.clone();
            store.subscribe_action(
                ActionSubscriber::from_fn(move |action: &ActionRecord, state: &Value| {
                    if !passes(&filter, &action.action_type) {
                        return;
                    }

                    let timestamp = Utc::now();
                    tracing::info!(
                        target: "nodus_store::logger",
                        action = %action.action_type,
                        payload = %action.payload,
                        "action @ {}",
                        timestamp.format("%H:%M:%S%.3f")
                    );
                    record(
                        &entries,
                        LogEntry {
                            kind: LogKind::Action,
                            call_type: action.action_type.clone(),
                            payload: action.payload.clone(),
                            timestamp,
                            prev_state: None,
                            next_state: state.clone(),
                        },
                    );
                }),
                SubscribeOptions::default(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_filter() {
        assert!(passes(&[], "anything"));
        let filter = vec!["cart/".to_string()];
        assert!(passes(&filter, "cart/add"));
        assert!(!passes(&filter, "user/login"));
    }
}
