//! Error types for the console core.

use thiserror::Error;

use crate::client::ClientError;
use crate::reducer::TurnStillOpen;

/// A result type using `ConsoleError`.
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Errors returned by the stream controller.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Another exchange is in progress.
    #[error("an exchange is already in progress")]
    Busy,

    /// The history cannot be replaced while a turn is open.
    #[error("an assistant turn is still open")]
    ExchangeOpen(#[from] TurnStillOpen),

    /// The message to send was empty.
    #[error("message is empty")]
    EmptyMessage,

    /// A request to the agent server failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ConsoleError {
    /// Returns `true` if retrying after the current exchange ends can succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Busy | Self::ExchangeOpen(_))
    }
}
