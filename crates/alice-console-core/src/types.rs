//! Wire types for the agent server API.
//!
//! These types mirror the JSON bodies exchanged with the agent server: the
//! chat request, the newline-delimited event records streamed back, and the
//! sidebar endpoints (tasks, skills, outputs, memory).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Chat Exchange
// =============================================================================

/// Client -> Server: body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's prompt text.
    pub message: String,
}

/// Server -> Client: one framed event record of the chat stream.
///
/// The `type` tag selects the variant; each variant carries only the
/// payload that is meaningful for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new step within the open turn has started.
    StartStep {
        /// Step ordinal assigned by the server.
        step: u32,
    },
    /// Reasoning text fragment for the current step.
    Thinking {
        /// Text to append.
        delta: String,
    },
    /// Intent text fragment for the current step.
    Content {
        /// Text to append.
        delta: String,
    },
    /// Short status notice for the current step.
    System {
        /// Notice text.
        content: String,
    },
    /// Output of a tool execution in the current step.
    ExecutionResult {
        /// Opaque result text, may carry a failure marker.
        content: String,
    },
    /// The final answer; closes the open turn.
    FinalAnswer {
        /// Answer text.
        content: String,
    },
}

impl ServerEvent {
    /// Wire name of the event type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StartStep { .. } => "start_step",
            Self::Thinking { .. } => "thinking",
            Self::Content { .. } => "content",
            Self::System { .. } => "system",
            Self::ExecutionResult { .. } => "execution_result",
            Self::FinalAnswer { .. } => "final_answer",
        }
    }
}

/// Acknowledgement body returned by `POST /api/interrupt` and
/// `POST /api/history/clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAck {
    /// Usually `"ok"`.
    pub status: String,
}

// =============================================================================
// Sidebar Types
// =============================================================================

/// Response of `GET /api/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksResponse {
    /// Raw task list text.
    pub content: String,
}

/// A skill as advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillInfo {
    /// One-line description.
    #[serde(default)]
    pub description: String,
}

/// Response of `GET /api/skills`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsResponse {
    /// Skill name to skill metadata.
    pub skills: BTreeMap<String, SkillInfo>,
}

/// Kind of an output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory with nested entries.
    Directory,
}

/// A produced output file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    /// File or directory name.
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type", default = "OutputEntry::default_kind")]
    pub kind: EntryKind,
    /// Modification time in seconds since the Unix epoch.
    #[serde(default)]
    pub mtime: f64,
    /// URL the file is served from.
    pub url: String,
    /// File size in bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Nested entries (directories only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutputEntry>,
    /// Whether the directory carries a browsable `index.html`.
    #[serde(default)]
    pub has_index: bool,
    /// URL of the browsable index, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,
}

impl OutputEntry {
    const fn default_kind() -> EntryKind {
        EntryKind::File
    }

    /// Check if this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Size in KiB, rounded to one decimal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_kib(&self) -> Option<f64> {
        self.size.map(|s| (s as f64 / 1024.0 * 10.0).round() / 10.0)
    }

    /// Modification time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        if !self.mtime.is_finite() || self.mtime < 0.0 {
            return None;
        }
        let secs = self.mtime.trunc() as i64;
        let nanos = (self.mtime.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// URL to open when browsing: the index page if any, else the entry itself.
    #[must_use]
    pub fn browse_url(&self) -> &str {
        match (&self.index_url, self.has_index) {
            (Some(index), true) => index,
            _ => &self.url,
        }
    }

    /// Walk this entry and its descendants depth-first, yielding the nesting depth.
    #[must_use]
    pub fn flatten(&self) -> Vec<(usize, &OutputEntry)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, entry)) = stack.pop() {
            out.push((depth, entry));
            for child in entry.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

/// Response of `GET /api/outputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsResponse {
    /// Top-level entries, directories first.
    pub files: Vec<OutputEntry>,
}

/// Response of `GET /api/memory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryResponse {
    /// Long-term memory text.
    #[serde(default)]
    pub ltm: String,
    /// Short-term memory text.
    #[serde(default)]
    pub stm: String,
}

/// Error response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error message.
    #[serde(alias = "detail")]
    pub error: String,
}

// =============================================================================
// Tests
// =============================================================================
