//! HTTP client for the agent server API.
//!
//! This module provides a typed client for the agent server, and the
//! [`ChatTransport`] / [`StatusSource`] seams the controller and the status
//! poller are written against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::ConsoleConfig;
use crate::session::Turn;
use crate::types::{
    ApiErrorResponse, ChatRequest, MemoryResponse, OutputEntry, OutputsResponse, SkillInfo,
    SkillsResponse, StatusAck, TasksResponse,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the body.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Raw body chunks of a streamed response.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Transport used by the stream controller.
///
/// Abstracted so tests can script the byte stream and the interrupt outcome.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the streamed chat request and return the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers non-2xx.
    async fn open_chat(&self, message: &str) -> Result<ByteStream, ClientError>;

    /// Ask the server to stop the running exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the notice could not be delivered.
    async fn send_interrupt(&self) -> Result<(), ClientError>;

    /// Fetch the persisted conversation history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is malformed.
    async fn fetch_history(&self) -> Result<Vec<Turn>, ClientError>;

    /// Delete the persisted conversation history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn clear_history(&self) -> Result<(), ClientError>;
}

/// Sidebar data shown next to the conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    /// Current task list text.
    pub tasks: String,
    /// Available skills by name.
    pub skills: BTreeMap<String, SkillInfo>,
    /// Produced output files.
    pub outputs: Vec<OutputEntry>,
}

/// Source of sidebar status data.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch tasks, skills and outputs together.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three requests fails.
    async fn fetch_status(&self) -> Result<StatusSnapshot, ClientError>;
}

/// Client for the agent server REST API.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ConsoleConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    /// Create a new client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a server-relative URL (such as an output file URL).
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn post_ack(&self, path: &str) -> Result<(), ClientError> {
        let url = format!("{}{path}", self.base_url);

        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        // The acknowledgement body carries nothing the console needs.
        match response.json::<StatusAck>().await {
            Ok(ack) => tracing::debug!(path, status = %ack.status, "Request acknowledged"),
            Err(e) => tracing::debug!(path, error = %e, "Unreadable acknowledgement body"),
        }
        Ok(())
    }

    // =========================================================================
    // Sidebar Operations
    // =========================================================================

    /// Get the current task list text.
    pub async fn tasks(&self) -> Result<String, ClientError> {
        let body: TasksResponse = self.get_json("/api/tasks").await?;
        Ok(body.content)
    }

    /// Get the available skills.
    pub async fn skills(&self) -> Result<BTreeMap<String, SkillInfo>, ClientError> {
        let body: SkillsResponse = self.get_json("/api/skills").await?;
        Ok(body.skills)
    }

    /// Get the produced output tree.
    pub async fn outputs(&self) -> Result<Vec<OutputEntry>, ClientError> {
        let body: OutputsResponse = self.get_json("/api/outputs").await?;
        Ok(body.files)
    }

    /// Get the agent's long and short term memory.
    pub async fn memory(&self) -> Result<MemoryResponse, ClientError> {
        self.get_json("/api/memory").await
    }
}

#[async_trait]
impl ChatTransport for AgentClient {
    async fn open_chat(&self, message: &str) -> Result<ByteStream, ClientError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            message: message.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        tracing::debug!(status = %response.status(), "Chat stream opened");
        Ok(response.bytes_stream().map(|r| r.map_err(ClientError::from)).boxed())
    }

    async fn send_interrupt(&self) -> Result<(), ClientError> {
        self.post_ack("/api/interrupt").await
    }

    async fn fetch_history(&self) -> Result<Vec<Turn>, ClientError> {
        self.get_json("/api/history").await
    }

    async fn clear_history(&self) -> Result<(), ClientError> {
        self.post_ack("/api/history/clear").await
    }
}

#[async_trait]
impl StatusSource for AgentClient {
    async fn fetch_status(&self) -> Result<StatusSnapshot, ClientError> {
        let (tasks, skills, outputs) =
            futures::try_join!(self.tasks(), self.skills(), self.outputs())?;
        Ok(StatusSnapshot {
            tasks,
            skills,
            outputs,
        })
    }
}
