//! Stream controller: one request/response exchange at a time.
//!
//! The controller appends the user turn and an open assistant turn, opens the
//! streamed chat request, feeds decoded events to the [`SessionReducer`], and
//! owns cancellation. Each exchange walks
//! `Idle -> Sending -> Streaming -> {Completed | Cancelled | Failed} -> Idle`.
//!
//! Cancellation is two independent signals: a local [`CancellationToken`]
//! that stops the read loop at its next suspension point, and a best-effort
//! interrupt notice to the server. Neither waits for the other.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::client::{ChatTransport, ClientError};
use crate::decoder::FrameDecoder;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{ConsoleError, Result};
use crate::reducer::{Applied, SessionReducer};
use crate::session::History;
use crate::types::ServerEvent;

/// Lifecycle of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    /// Ready for the next `send`.
    #[default]
    Idle,
    /// Request dispatched, no response yet.
    Sending,
    /// Consuming the event stream.
    Streaming,
    /// Final answer received or the stream ended cleanly.
    Completed,
    /// Stopped by `interrupt`.
    Cancelled,
    /// Transport failure.
    Failed,
}

impl ExchangeState {
    /// Human-readable display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Sending => "Sending",
            Self::Streaming => "Streaming",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Check if an exchange is in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The stream finished. `answered` is `false` when it ended without a
    /// final answer.
    Completed {
        /// Whether a final answer arrived.
        answered: bool,
    },
    /// Stopped by `interrupt`.
    Cancelled,
    /// The transport failed.
    Failed {
        /// Error message.
        message: String,
    },
}

impl ExchangeOutcome {
    /// Terminal state corresponding to this outcome.
    #[must_use]
    pub const fn state(&self) -> ExchangeState {
        match self {
            Self::Completed { .. } => ExchangeState::Completed,
            Self::Cancelled => ExchangeState::Cancelled,
            Self::Failed { .. } => ExchangeState::Failed,
        }
    }
}

/// Result of an `interrupt` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// No exchange was open; nothing happened.
    NotActive,
    /// The open exchange was already being cancelled.
    AlreadyRequested,
    /// The exchange was cancelled locally.
    Cancelled {
        /// Whether the server acknowledged the interrupt notice.
        notice_delivered: bool,
    },
}

/// Drives chat exchanges against a [`ChatTransport`].
pub struct StreamController<T> {
    transport: Arc<T>,
    reducer: Mutex<SessionReducer>,
    active: Mutex<Option<CancellationToken>>,
    state: watch::Sender<ExchangeState>,
    outcome: watch::Sender<Option<ExchangeOutcome>>,
    diagnostics: Diagnostics,
    finished: Arc<Notify>,
}

impl<T: ChatTransport> StreamController<T> {
    /// Create a controller with its own diagnostics log.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_diagnostics(transport, Diagnostics::default())
    }

    /// Create a controller recording anomalies into `diagnostics`.
    #[must_use]
    pub fn with_diagnostics(transport: Arc<T>, diagnostics: Diagnostics) -> Self {
        let (state, _) = watch::channel(ExchangeState::Idle);
        let (outcome, _) = watch::channel(None);
        Self {
            transport,
            reducer: Mutex::new(SessionReducer::new(diagnostics.clone())),
            active: Mutex::new(None),
            state,
            outcome,
            diagnostics,
            finished: Arc::new(Notify::new()),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Subscribe to history snapshots, republished after every applied event.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<History> {
        self.reducer.lock().subscribe()
    }

    /// Subscribe to exchange state transitions.
    ///
    /// The terminal state is immediately followed by `Idle`, and `watch`
    /// keeps only the latest value, so receivers usually see `Idle` rather
    /// than `Completed`, `Cancelled` or `Failed`. Use
    /// [`subscribe_outcome`](Self::subscribe_outcome) to observe how an
    /// exchange ended.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ExchangeState> {
        self.state.subscribe()
    }

    /// Subscribe to exchange outcomes, published once per finished exchange
    /// before the state returns to `Idle`.
    #[must_use]
    pub fn subscribe_outcome(&self) -> watch::Receiver<Option<ExchangeOutcome>> {
        self.outcome.subscribe()
    }

    /// Current history snapshot.
    #[must_use]
    pub fn history(&self) -> History {
        self.reducer.lock().snapshot()
    }

    /// Current exchange state.
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        *self.state.borrow()
    }

    /// Outcome of the most recent finished exchange.
    #[must_use]
    pub fn last_outcome(&self) -> Option<ExchangeOutcome> {
        self.outcome.borrow().clone()
    }

    /// Shared diagnostics log.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Signal fired once every time an exchange finishes.
    #[must_use]
    pub fn finished_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.finished)
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Seed the history from the server's persisted copy.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Busy`] during an exchange, or the fetch error.
    pub async fn load_history(&self) -> Result<usize> {
        self.ensure_idle()?;
        let prior = self.transport.fetch_history().await?;
        let count = prior.len();
        self.reducer.lock().seed(prior)?;
        tracing::info!(turns = count, "Conversation history loaded");
        Ok(count)
    }

    /// Delete the persisted history and empty the local one.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Busy`] during an exchange, or the request error.
    pub async fn clear_history(&self) -> Result<()> {
        self.ensure_idle()?;
        self.transport.clear_history().await?;
        self.reducer.lock().seed(Vec::new())?;
        tracing::info!("Conversation history cleared");
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.active.lock().is_some() {
            return Err(ConsoleError::Busy);
        }
        Ok(())
    }

    // =========================================================================
    // Exchange
    // =========================================================================

    /// Run one exchange to completion.
    ///
    /// Settles once the assistant turn is closed, whether by a final answer,
    /// end of stream, cancellation, or transport failure. Only setup problems
    /// are returned as errors; how the exchange ended is the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::EmptyMessage`] for blank input and
    /// [`ConsoleError::Busy`] if another exchange is running.
    pub async fn send(&self, text: &str) -> Result<ExchangeOutcome> {
        if text.trim().is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }

        let token = self.begin(text)?;
        let outcome = self.drive(text, &token).await;
        self.finish(&outcome);
        Ok(outcome)
    }

    /// Cancel the open exchange, if any.
    ///
    /// The local read is aborted and the open turn closed immediately; the
    /// interrupt notice is sent afterwards and its failure is only recorded.
    /// Calling this with no exchange open, or twice, is a no-op.
    pub async fn interrupt(&self) -> InterruptOutcome {
        {
            // The slot stays claimed while the turn is closed, so the turn
            // closed here always belongs to the exchange being cancelled.
            let active = self.active.lock();
            match active.as_ref() {
                None => return InterruptOutcome::NotActive,
                Some(token) if token.is_cancelled() => return InterruptOutcome::AlreadyRequested,
                Some(token) => token.cancel(),
            }
            self.reducer.lock().close_open_turn();
        }

        tracing::info!("Interrupting exchange");

        let notice_delivered = match self.transport.send_interrupt().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Interrupt notice failed");
                self.diagnostics.record(DiagnosticKind::InterruptNotice {
                    message: e.to_string(),
                });
                false
            }
        };

        InterruptOutcome::Cancelled { notice_delivered }
    }

    /// Claim the exchange slot and open the turns.
    fn begin(&self, text: &str) -> Result<CancellationToken> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(ConsoleError::Busy);
        }
        self.reducer.lock().begin_exchange(text)?;

        let token = CancellationToken::new();
        *active = Some(token.clone());
        self.state.send_replace(ExchangeState::Sending);
        tracing::info!(len = text.len(), "Exchange started");
        Ok(token)
    }

    async fn drive(&self, text: &str, token: &CancellationToken) -> ExchangeOutcome {
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return ExchangeOutcome::Cancelled,
            opened = self.transport.open_chat(text) => opened,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(e) => return failed(&e),
        };

        self.state.send_replace(ExchangeState::Streaming);
        let mut decoder = FrameDecoder::new(self.diagnostics.clone());
        let mut answered = false;

        loop {
            let chunk = tokio::select! {
                biased;
                () = token.cancelled() => return ExchangeOutcome::Cancelled,
                chunk = body.next() => chunk,
            };

            let events = match chunk {
                Some(Ok(bytes)) => decoder.feed(&bytes),
                Some(Err(e)) => return failed(&e),
                None => {
                    let rest: Vec<ServerEvent> = decoder.finish().into_iter().collect();
                    match self.apply_all(rest, token) {
                        Some(closed) => answered |= closed,
                        None => return ExchangeOutcome::Cancelled,
                    }
                    if !answered {
                        tracing::info!("Stream ended without a final answer");
                    }
                    return ExchangeOutcome::Completed { answered };
                }
            };

            match self.apply_all(events, token) {
                Some(closed) => answered |= closed,
                None => return ExchangeOutcome::Cancelled,
            }
        }
    }

    /// Apply a batch of framed events in order.
    ///
    /// Returns whether one of them closed the turn, or `None` if cancellation
    /// took effect first. The check happens under the reducer lock, so no
    /// event is applied after `interrupt` has closed the turn.
    fn apply_all(&self, events: Vec<ServerEvent>, token: &CancellationToken) -> Option<bool> {
        let mut reducer = self.reducer.lock();
        let mut closed = false;
        for event in events {
            if token.is_cancelled() {
                return None;
            }
            closed |= reducer.apply(event) == Applied::Closed;
        }
        Some(closed)
    }

    fn finish(&self, outcome: &ExchangeOutcome) {
        if let ExchangeOutcome::Failed { message } = outcome {
            self.diagnostics.record(DiagnosticKind::Transport {
                message: message.clone(),
            });
        }

        self.reducer.lock().close_open_turn();
        self.outcome.send_replace(Some(outcome.clone()));

        {
            let mut active = self.active.lock();
            self.state.send_replace(outcome.state());
            self.state.send_replace(ExchangeState::Idle);
            *active = None;
        }

        tracing::info!(outcome = outcome.state().as_str(), "Exchange finished");
        self.finished.notify_one();
    }
}

fn failed(error: &ClientError) -> ExchangeOutcome {
    tracing::warn!(error = %error, "Chat transport failed");
    ExchangeOutcome::Failed {
        message: error.to_string(),
    }
}
