//! Session reducer: the only writer of conversation state.
//!
//! Every decoded event goes through [`SessionReducer::apply`]. After each
//! change the reducer republishes the whole history as a fresh snapshot on a
//! `watch` channel, so observers always see a strict prefix of the event
//! sequence and never a turn that is half-way through an event.

use tokio::sync::watch;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::session::{History, Step, Turn};
use crate::types::ServerEvent;

/// What `apply` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The event changed the open turn.
    Updated,
    /// The event closed the open turn.
    Closed,
    /// The event had no valid target and was dropped.
    Dropped,
}

/// Error returned when the history cannot be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("an assistant turn is still open")]
pub struct TurnStillOpen;

/// Folds server events into the conversation history.
#[derive(Debug)]
pub struct SessionReducer {
    history: History,
    publisher: watch::Sender<History>,
    diagnostics: Diagnostics,
}

impl SessionReducer {
    /// Create a reducer with an empty history.
    #[must_use]
    pub fn new(diagnostics: Diagnostics) -> Self {
        let (publisher, _) = watch::channel(History::default());
        Self {
            history: History::default(),
            publisher,
            diagnostics,
        }
    }

    /// Subscribe to history snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<History> {
        self.publisher.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> History {
        self.history.clone()
    }

    /// Check if an assistant turn is open.
    #[must_use]
    pub fn has_open_turn(&self) -> bool {
        self.history.open_turn().is_some()
    }

    /// Replace the whole history with prior turns (bulk overwrite).
    ///
    /// # Errors
    ///
    /// Returns [`TurnStillOpen`] while an exchange is in flight.
    pub fn seed(&mut self, prior: Vec<Turn>) -> Result<(), TurnStillOpen> {
        if self.has_open_turn() {
            return Err(TurnStillOpen);
        }
        tracing::debug!(turns = prior.len(), "Seeding conversation history");
        self.history = History::from_turns(prior);
        self.publish();
        Ok(())
    }

    /// Append a user turn followed by a new open assistant turn.
    ///
    /// # Errors
    ///
    /// Returns [`TurnStillOpen`] if the previous exchange was not closed.
    pub fn begin_exchange(&mut self, user_text: &str) -> Result<(), TurnStillOpen> {
        if self.has_open_turn() {
            return Err(TurnStillOpen);
        }
        self.history.push(Turn::user(user_text));
        self.history.push(Turn::open_assistant());
        self.publish();
        Ok(())
    }

    /// Mark the open turn terminal, keeping whatever it accumulated.
    ///
    /// Returns `false` when no turn was open.
    pub fn close_open_turn(&mut self) -> bool {
        let Some(turn) = self.history.open_turn_mut() else {
            return false;
        };
        turn.is_complete = true;
        self.publish();
        true
    }

    /// Apply one event to the open turn.
    ///
    /// A dropped event leaves the history untouched, shared turns included.
    pub fn apply(&mut self, event: ServerEvent) -> Applied {
        let kind = event.kind();
        let Some(open) = self.history.open_turn() else {
            return self.drop_orphan(kind, "no open turn");
        };

        match &event {
            ServerEvent::StartStep { step } if open.has_step(*step) => {
                tracing::warn!(step, "Duplicate step id, dropping start_step");
                self.diagnostics
                    .record(DiagnosticKind::DuplicateStep { step: *step });
                return Applied::Dropped;
            }
            ServerEvent::StartStep { .. } | ServerEvent::FinalAnswer { .. } => {}
            _ if open.current_step().is_none() => {
                return self.drop_orphan(kind, "no current step");
            }
            _ => {}
        }

        let Some(turn) = self.history.open_turn_mut() else {
            return Applied::Dropped;
        };
        let outcome = match event {
            ServerEvent::StartStep { step } => {
                tracing::debug!(step, "Step started");
                turn.push_step(Step::new(step));
                Applied::Updated
            }
            ServerEvent::FinalAnswer { content } => {
                tracing::debug!(steps = turn.steps.len(), "Final answer received");
                turn.final_answer = content;
                turn.is_complete = true;
                Applied::Closed
            }
            event => {
                let Some(step) = turn.current_step_mut() else {
                    return Applied::Dropped;
                };
                match event {
                    ServerEvent::Thinking { delta } => step.push_thinking(&delta),
                    ServerEvent::Content { delta } => step.push_content(&delta),
                    ServerEvent::System { content } => step.push_system_log(content),
                    ServerEvent::ExecutionResult { content } => {
                        step.push_execution_result(content);
                    }
                    ServerEvent::StartStep { .. } | ServerEvent::FinalAnswer { .. } => {}
                }
                Applied::Updated
            }
        };

        self.publish();
        outcome
    }

    fn drop_orphan(&self, event: &'static str, reason: &str) -> Applied {
        tracing::warn!(event, reason, "Dropping event");
        self.diagnostics.record(DiagnosticKind::OrphanEvent { event });
        Applied::Dropped
    }

    fn publish(&self) {
        self.publisher.send_replace(self.history.clone());
    }
}
