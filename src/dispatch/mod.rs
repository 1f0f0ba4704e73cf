//! Command dispatch to the remote webhook
//!
//! Sends `{command, timestamp}` as JSON, then normalizes and routes the
//! staged response. Failures are reported once and never retried.

mod response;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

pub use response::{Record, Reply, Stage, StagedBody};

use crate::config::{Config, Phrases};
use crate::error::DispatchError;
use crate::{Error, Result};

/// Sends a command and returns the routed reply
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Dispatch one command
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` on network failure, non-2xx status, malformed
    /// body or timeout
    async fn dispatch(&self, command: &str) -> std::result::Result<Reply, DispatchError>;
}

/// Request body posted to the webhook
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
    timestamp: String,
}

/// Dispatcher posting to an HTTP webhook
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
    phrases: Phrases,
}

impl HttpDispatcher {
    /// Create a dispatcher for `endpoint` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty or the HTTP client cannot be built
    pub fn new(endpoint: impl Into<String>, timeout: Duration, phrases: Phrases) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::Config("dispatch endpoint is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            phrases,
        })
    }

    /// Create a dispatcher from session configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.dispatch_timeout,
            config.phrases.clone(),
        )
    }

    /// Target URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CommandDispatcher for HttpDispatcher {
    async fn dispatch(&self, command: &str) -> std::result::Result<Reply, DispatchError> {
        let request = CommandRequest {
            command,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        tracing::debug!(endpoint = %self.endpoint, command, "dispatching command");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "dispatch request failed");
                DispatchError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "webhook returned error status");
            return Err(DispatchError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse webhook response");
            if e.is_timeout() {
                DispatchError::TimedOut
            } else {
                DispatchError::Malformed(e.to_string())
            }
        })?;

        let staged = StagedBody::from_value(body)?;
        tracing::info!(stage = ?staged.stage, records = staged.message.len(), "webhook replied");

        Ok(staged.route(&self.phrases))
    }
}
