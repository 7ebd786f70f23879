//! Conversation model: turns, steps, and immutable history snapshots.
//!
//! A [`History`] is an ordered list of shared [`Turn`]s. Cloning a history is
//! cheap (reference counts only), and the reducer mutates the open turn with
//! copy-on-write, so a snapshot handed to an observer never changes under it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Substring the agent server embeds in failed execution results.
pub const EXECUTION_FAILURE_MARKER: &str = "执行失败";

/// Whether an execution result string signals a failure.
#[must_use]
pub fn is_failure(result: &str) -> bool {
    result.contains(EXECUTION_FAILURE_MARKER)
}

/// How a step is presented: pure reasoning, or reasoning followed by action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Thinking and planning only.
    Reasoning,
    /// At least one tool was executed and observed.
    ActionObserve,
}

/// One reasoning/action unit within an assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Ordinal assigned by the server, unique within the turn.
    pub id: u32,
    /// Reasoning narrative, append-only.
    #[serde(default)]
    pub thinking: String,
    /// Stated intent, append-only.
    #[serde(default)]
    pub content: String,
    /// Status notices in arrival order.
    #[serde(default)]
    pub system_logs: Vec<String>,
    /// Tool execution results in arrival order.
    #[serde(default)]
    pub execution_results: Vec<String>,
}

impl Step {
    /// Create an empty step.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Append a reasoning fragment.
    pub fn push_thinking(&mut self, delta: &str) {
        self.thinking.push_str(delta);
    }

    /// Append an intent fragment.
    pub fn push_content(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    /// Append a status notice.
    pub fn push_system_log(&mut self, notice: impl Into<String>) {
        self.system_logs.push(notice.into());
    }

    /// Append an execution result.
    pub fn push_execution_result(&mut self, result: impl Into<String>) {
        self.execution_results.push(result.into());
    }

    /// Presentation phase of the step.
    #[must_use]
    pub fn phase(&self) -> StepPhase {
        if self.execution_results.is_empty() {
            StepPhase::Reasoning
        } else {
            StepPhase::ActionObserve
        }
    }

    /// Most recent status notice.
    #[must_use]
    pub fn latest_notice(&self) -> Option<&str> {
        self.system_logs.last().map(String::as_str)
    }

    /// Number of failed execution results.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.execution_results
            .iter()
            .filter(|r| is_failure(r))
            .count()
    }
}

/// The assistant side of an exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantTurn {
    /// Steps in arrival order. Shared, so a snapshot copies only the step
    /// being written to.
    #[serde(default)]
    pub steps: Vec<Arc<Step>>,
    /// Final answer text, empty until the turn completes with an answer.
    #[serde(default)]
    pub final_answer: String,
    /// Whether a terminal condition was reached.
    #[serde(default)]
    pub is_complete: bool,
}

impl AssistantTurn {
    /// The step currently receiving events.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.last().map(AsRef::as_ref)
    }

    /// Mutable access to the current step, cloning it first if any snapshot
    /// still references it.
    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.last_mut().map(Arc::make_mut)
    }

    /// Append a step; it becomes the current step.
    pub fn push_step(&mut self, step: Step) {
        self.steps.push(Arc::new(step));
    }

    /// Check if a step with the given id exists.
    #[must_use]
    pub fn has_step(&self, id: u32) -> bool {
        self.steps.iter().any(|s| s.id == id)
    }
}

/// One user or assistant contribution in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Text submitted by the user.
    User {
        /// Message text.
        content: String,
    },
    /// The agent's response.
    #[serde(rename = "bot", alias = "assistant")]
    Assistant(AssistantTurn),
}

impl Turn {
    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an empty, open assistant turn.
    #[must_use]
    pub fn open_assistant() -> Self {
        Self::Assistant(AssistantTurn::default())
    }

    /// Check if this is a user turn.
    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Check if this turn still receives events.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Assistant(turn) if !turn.is_complete)
    }

    /// The assistant payload, if any.
    #[must_use]
    pub fn as_assistant(&self) -> Option<&AssistantTurn> {
        match self {
            Self::Assistant(turn) => Some(turn),
            Self::User { .. } => None,
        }
    }
}

/// Immutable snapshot of the conversation history.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<Arc<Turn>>,
}

impl History {
    /// Build a history from prior turns.
    ///
    /// Assistant turns loaded from storage are closed, since nothing will
    /// ever stream into them again.
    #[must_use]
    pub fn from_turns(turns: impl IntoIterator<Item = Turn>) -> Self {
        let turns = turns
            .into_iter()
            .map(|mut turn| {
                if let Turn::Assistant(assistant) = &mut turn {
                    assistant.is_complete = true;
                }
                Arc::new(turn)
            })
            .collect();
        Self { turns }
    }

    /// All turns in order.
    pub fn turns(&self) -> impl ExactSizeIterator<Item = &Turn> {
        self.turns.iter().map(AsRef::as_ref)
    }

    /// Turn at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index).map(AsRef::as_ref)
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if there are no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The assistant turn still receiving events, if any.
    #[must_use]
    pub fn open_turn(&self) -> Option<&AssistantTurn> {
        self.turns
            .last()
            .filter(|turn| turn.is_open())
            .and_then(|turn| turn.as_assistant())
    }

    /// The most recent assistant turn.
    #[must_use]
    pub fn last_assistant(&self) -> Option<&AssistantTurn> {
        self.turns.iter().rev().find_map(|turn| turn.as_assistant())
    }

    /// Number of open turns.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.turns.iter().filter(|turn| turn.is_open()).count()
    }

    /// Clone the turns out, e.g. for persistence.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().map(|turn| Turn::clone(turn)).collect()
    }

    /// Check whether two snapshots share the same turn at `index`.
    #[must_use]
    pub fn shares_turn(&self, other: &Self, index: usize) -> bool {
        match (self.turns.get(index), other.turns.get(index)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(Arc::new(turn));
    }

    /// Mutable access to the open assistant turn, cloning it first if any
    /// snapshot still references it.
    pub(crate) fn open_turn_mut(&mut self) -> Option<&mut AssistantTurn> {
        let last = self.turns.last_mut()?;
        if !last.is_open() {
            return None;
        }
        match Arc::make_mut(last) {
            Turn::Assistant(turn) => Some(turn),
            Turn::User { .. } => None,
        }
    }
}
