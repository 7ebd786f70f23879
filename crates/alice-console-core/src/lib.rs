//! Client core for the Alice agent console.
//!
//! This crate turns the agent server's streamed chat responses into an
//! observable conversation history:
//!
//! - **Decoder**: frames the newline-delimited JSON event stream
//! - **Session**: steps, turns and the immutable history snapshot
//! - **Reducer**: folds events into the open assistant turn
//! - **Controller**: one exchange at a time, with interrupt
//! - **Status**: background refresh of tasks, skills and outputs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use alice_console_core::{AgentClient, ConsoleConfig, StreamController};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(AgentClient::new(&ConsoleConfig::default())?);
//! let controller = StreamController::new(client);
//!
//! let outcome = controller.send("列出当前目录").await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod reducer;
pub mod session;
pub mod status;
pub mod types;

pub use client::{AgentClient, ByteStream, ChatTransport, ClientError, StatusSnapshot, StatusSource};
pub use config::ConsoleConfig;
pub use controller::{ExchangeOutcome, ExchangeState, InterruptOutcome, StreamController};
pub use decoder::FrameDecoder;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{ConsoleError, Result};
pub use reducer::{Applied, SessionReducer, TurnStillOpen};
pub use session::{is_failure, AssistantTurn, History, Step, StepPhase, Turn};
pub use status::StatusPoller;
pub use types::{EntryKind, MemoryResponse, OutputEntry, ServerEvent, SkillInfo};
