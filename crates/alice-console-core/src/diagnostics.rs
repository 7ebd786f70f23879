//! Side-channel record of non-fatal anomalies.
//!
//! Nothing in the session core is allowed to abort an exchange except a
//! transport failure or a cancellation. Everything else is dropped and
//! recorded here (and logged through `tracing`).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Kind of anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A framed line was not a valid event record.
    MalformedFrame {
        /// The offending line (possibly truncated).
        line: String,
        /// Parser message.
        error: String,
    },
    /// An event arrived with no current step or no open turn.
    OrphanEvent {
        /// Wire name of the event type.
        event: &'static str,
    },
    /// A `start_step` repeated an id already present in the open turn.
    DuplicateStep {
        /// The repeated id.
        step: u32,
    },
    /// The chat transport failed; the exchange ended as failed.
    Transport {
        /// Error message.
        message: String,
    },
    /// The out-of-band interrupt notice could not be delivered.
    InterruptNotice {
        /// Error message.
        message: String,
    },
    /// A sidebar status refresh failed.
    StatusRefresh {
        /// Error message.
        message: String,
    },
}

/// A recorded anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// When it was recorded.
    pub at: DateTime<Utc>,
    /// What happened.
    pub kind: DiagnosticKind,
}

/// Longest line excerpt kept in a [`DiagnosticKind::MalformedFrame`].
const MAX_LINE_EXCERPT: usize = 200;

/// Bounded, shared diagnostics log. The oldest records are dropped first.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    inner: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
}

impl Diagnostics {
    /// Create a log holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
        }
    }

    /// Append a record.
    pub fn record(&self, kind: DiagnosticKind) {
        let mut log = self.inner.lock();
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(Diagnostic {
            at: Utc::now(),
            kind,
        });
    }

    /// Record a malformed line, keeping only a short excerpt of it.
    pub fn malformed_frame(&self, line: &str, error: impl ToString) {
        let line = match line.char_indices().nth(MAX_LINE_EXCERPT) {
            Some((idx, _)) => format!("{}...", &line[..idx]),
            None => line.to_string(),
        };
        self.record(DiagnosticKind::MalformedFrame {
            line,
            error: error.to_string(),
        });
    }

    /// Copy out the current records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(256)
    }
}
