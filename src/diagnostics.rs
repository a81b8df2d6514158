// src/diagnostics.rs
// Development diagnostics - soft failures that are logged and journaled, never thrown

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// Phase of the subscriber pipeline a fault was caught in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberPhase {
    Mutation,
    Before,
    After,
    Error,
}

impl fmt::Display for SubscriberPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubscriberPhase::Mutation => "mutation",
            SubscriberPhase::Before => "before action",
            SubscriberPhase::After => "after action",
            SubscriberPhase::Error => "error action",
        })
    }
}

/// A non-fatal condition reported through the diagnostics channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnknownMutation { mutation_type: String },
    UnknownAction { action_type: String },
    UnknownLocalMutation { local_type: String, global_type: String },
    UnknownLocalAction { local_type: String, global_type: String },
    DuplicateNamespace { namespace: String, path: String },
    DuplicateGetter { getter: String },
    StateFieldOverridden { field: String, path: String },
    StrictViolation,
    SubscriberFault { phase: SubscriberPhase, message: String },
}

impl Diagnostic {
    fn is_warning(&self) -> bool {
        matches!(
            self,
            Diagnostic::StateFieldOverridden { .. } | Diagnostic::SubscriberFault { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownMutation { mutation_type } => {
                write!(f, "unknown mutation type: {}", mutation_type)
            }
            Diagnostic::UnknownAction { action_type } => write!(f, "unknown action type: {}", action_type),
            Diagnostic::UnknownLocalMutation { local_type, global_type } => write!(
                f,
                "unknown local mutation type: {}, global type: {}",
                local_type, global_type
            ),
            Diagnostic::UnknownLocalAction { local_type, global_type } => write!(
                f,
                "unknown local action type: {}, global type: {}",
                local_type, global_type
            ),
            Diagnostic::DuplicateNamespace { namespace, path } => write!(
                f,
                "duplicate namespace {} for the namespaced module {}",
                namespace, path
            ),
            Diagnostic::DuplicateGetter { getter } => write!(f, "duplicate getter key: {}", getter),
            Diagnostic::StateFieldOverridden { field, path } => write!(
                f,
                "state field \"{}\" was overridden by a module with the same name at \"{}\"",
                field, path
            ),
            Diagnostic::StrictViolation => f.write_str("do not mutate store state outside mutation handlers"),
            Diagnostic::SubscriberFault { phase, message } => {
                write!(f, "error in {} subscribers: {}", phase, message)
            }
        }
    }
}

/// Bounded journal of reported diagnostics.
#[derive(Debug)]
pub struct Diagnostics {
    enabled: bool,
    capacity: usize,
    journal: Mutex<VecDeque<Diagnostic>>,
}

impl Diagnostics {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity,
            journal: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log and journal a diagnostic. Does nothing when diagnostics are disabled.
    pub fn report(&self, diagnostic: Diagnostic) {
        if !self.enabled {
            return;
        }

        if diagnostic.is_warning() {
            tracing::warn!(target: "nodus_store", "{}", diagnostic);
        } else {
            tracing::error!(target: "nodus_store", "{}", diagnostic);
        }

        if self.capacity == 0 {
            return;
        }
        let mut journal = self.journal.lock();
        if journal.len() >= self.capacity {
            journal.pop_front();
        }
        journal.push_back(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.journal.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.journal.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_is_bounded() {
        let diagnostics = Diagnostics::new(true, 2);
        for n in 0..3 {
            diagnostics.report(Diagnostic::UnknownMutation {
                mutation_type: format!("m{}", n),
            });
        }

        let entries = diagnostics.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            Diagnostic::UnknownMutation { mutation_type: "m1".to_string() }
        );
    }

    #[test]
    fn test_disabled_diagnostics_are_dropped() {
        let diagnostics = Diagnostics::new(false, 8);
        diagnostics.report(Diagnostic::StrictViolation);
        assert!(diagnostics.snapshot().is_empty());
    }

    #[test]
    fn test_messages() {
        let d = Diagnostic::UnknownLocalMutation {
            local_type: "inc".to_string(),
            global_type: "a/inc".to_string(),
        };
        assert_eq!(d.to_string(), "unknown local mutation type: inc, global type: a/inc");
        let d = Diagnostic::SubscriberFault {
            phase: SubscriberPhase::After,
            message: "boom".to_string(),
        };
        assert_eq!(d.to_string(), "error in after action subscribers: boom");
    }
}
