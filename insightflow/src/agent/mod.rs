//! The external agent runtime seam.
//!
//! The pipeline treats the agent as a function from (history, prompt) to text.
//! Model choice, tool use and reasoning all happen behind [`AgentRuntime`].

#[cfg(feature = "responses-agent")]
mod responses;

#[cfg(feature = "responses-agent")]
pub use responses::{ResponsesAgent, ResponsesAgentFactory, ResponsesAgentSettings};

use crate::context::Message;
use crate::errors::{AgentInvocationError, InsightflowError, MissingCredentialsError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Final output of one agent invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    /// The final answer text.
    pub content: String,
    /// The model that produced the answer.
    pub model: String,
    /// Provider-side response identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Prompt tokens, when the provider reports usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Completion tokens, when the provider reports usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Wall time of the whole invocation, tool rounds included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Number of local tool rounds resolved before the final answer.
    #[serde(default)]
    pub tool_rounds: u32,
}

impl AgentResponse {
    /// Creates a response carrying only text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

/// Trait for the external agent runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs one prompt to completion.
    ///
    /// `history` is `None` when the call must not see earlier turns.
    /// Successful-but-empty output is reported as an error, never as empty text.
    async fn invoke(
        &self,
        history: Option<Vec<Message>>,
        prompt: &str,
    ) -> Result<AgentResponse, AgentInvocationError>;
}

/// Credentials for the database tool the agent is given.
#[derive(Clone, Debug)]
pub struct AgentCredentials {
    /// Project reference used to address the hosted MCP server.
    pub supabase_project_id: String,
    /// Personal access token sent to the MCP server. Never logged.
    pub supabase_access_token: SecretString,
}

impl AgentCredentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            supabase_project_id: project_id.into(),
            supabase_access_token: SecretString::from(access_token.into()),
        }
    }

    /// Fails fast if any credential is blank.
    pub fn validate(&self) -> Result<(), MissingCredentialsError> {
        let mut missing = Vec::new();
        if self.supabase_project_id.trim().is_empty() {
            missing.push("supabase_project_id".to_string());
        }
        if self.supabase_access_token.expose_secret().trim().is_empty() {
            missing.push("supabase_access_token".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingCredentialsError::new(missing))
        }
    }

    /// Returns the MCP endpoint for the configured project.
    #[must_use]
    pub fn mcp_server_url(&self) -> String {
        format!(
            "https://mcp.supabase.com/mcp?project_ref={}",
            self.supabase_project_id
        )
    }
}

/// Builds an agent for one run from its credentials and system instructions.
pub trait AgentFactory: Send + Sync {
    /// Creates the runtime. Credentials are validated before anything else.
    fn build(
        &self,
        credentials: &AgentCredentials,
        instructions: &str,
    ) -> Result<Arc<dyn AgentRuntime>, InsightflowError>;
}
