//! Agent runtime backed by an OpenAI-compatible Responses endpoint.
//!
//! The agent is given the hosted Supabase MCP tool, hosted web search, and a
//! local `get_current_time` function. Hosted tools run server-side; local
//! function calls are answered here and fed back until the model produces a
//! final message or the round limit is hit.

use super::{AgentCredentials, AgentFactory, AgentResponse, AgentRuntime};
use crate::context::Message;
use crate::errors::{AgentInvocationError, InsightflowError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default API base.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const CURRENT_TIME_TOOL: &str = "get_current_time";

/// Model and transport settings for [`ResponsesAgent`].
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct ResponsesAgentSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Applies to each HTTP request, not to the whole tool loop.
    pub timeout: Duration,
    /// Local tool rounds allowed before the call fails.
    pub max_tool_rounds: u32,
    /// Whether the hosted web search tool is offered.
    pub web_search: bool,
}

impl Default for ResponsesAgentSettings {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(300),
            max_tool_rounds: 8,
            web_search: true,
        }
    }
}

/// The `business_expert` agent.
pub struct ResponsesAgent {
    client: reqwest::Client,
    settings: ResponsesAgentSettings,
    instructions: String,
    tools: Vec<Value>,
}

impl std::fmt::Debug for ResponsesAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesAgent")
            .field("model", &self.settings.model)
            .field("base_url", &self.settings.base_url)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ResponsesAgent {
    /// Creates an agent. Credentials are validated first.
    pub fn new(
        settings: ResponsesAgentSettings,
        credentials: &AgentCredentials,
        instructions: impl Into<String>,
    ) -> Result<Self, InsightflowError> {
        credentials.validate()?;

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AgentInvocationError::new(format!("could not build HTTP client: {e}")))?;

        let tools = tool_definitions(credentials, settings.web_search);
        Ok(Self {
            client,
            settings,
            instructions: instructions.into(),
            tools,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.settings.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, input: &[Value]) -> Value {
        json!({
            "model": self.settings.model,
            "instructions": self.instructions,
            "input": input,
            "tools": self.tools,
            "temperature": self.settings.temperature,
            "top_p": self.settings.top_p,
        })
    }

    async fn send(&self, input: &[Value]) -> Result<ResponsesReply, AgentInvocationError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.settings.api_key.expose_secret())
            .json(&self.request_body(input))
            .send()
            .await
            .map_err(|e| AgentInvocationError::new(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentInvocationError::new(format!(
                "runtime returned {status}: {}",
                error_message(&body)
            ))
            .with_status_code(status.as_u16()));
        }

        let reply: ResponsesReply = response
            .json()
            .await
            .map_err(|e| AgentInvocationError::new(format!("malformed runtime response: {e}")))?;

        if let Some(error) = reply.error.as_ref().filter(|e| !e.is_null()) {
            return Err(AgentInvocationError::new(format!(
                "runtime reported an error: {error}"
            )));
        }
        Ok(reply)
    }
}

#[async_trait]
impl AgentRuntime for ResponsesAgent {
    async fn invoke(
        &self,
        history: Option<Vec<Message>>,
        prompt: &str,
    ) -> Result<AgentResponse, AgentInvocationError> {
        let start = Instant::now();
        let mut input: Vec<Value> = history
            .unwrap_or_default()
            .into_iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();
        input.push(json!({"role": "user", "content": prompt}));

        let mut input_tokens = 0;
        let mut output_tokens = 0;

        for round in 0..=self.settings.max_tool_rounds {
            let reply = self.send(&input).await?;
            if let Some(usage) = &reply.usage {
                input_tokens += usage.input_tokens;
                output_tokens += usage.output_tokens;
            }

            let calls = function_calls(&reply.output);
            if calls.is_empty() {
                let content = output_text(&reply.output);
                if content.trim().is_empty() {
                    return Err(AgentInvocationError::new("runtime returned no text output"));
                }
                return Ok(AgentResponse {
                    content,
                    model: reply.model,
                    response_id: Some(reply.id),
                    input_tokens: Some(input_tokens),
                    output_tokens: Some(output_tokens),
                    latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
                    tool_rounds: round,
                });
            }

            debug!(round, calls = calls.len(), "resolving local tool calls");
            input.extend(reply.output.iter().cloned());
            for call in calls {
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": call.call_id,
                    "output": run_local_tool(&call.name),
                }));
            }
        }

        Err(AgentInvocationError::new(format!(
            "tool loop did not finish within {} rounds",
            self.settings.max_tool_rounds
        )))
    }
}

/// Builds [`ResponsesAgent`]s from shared settings.
#[derive(Debug, Clone, Default)]
pub struct ResponsesAgentFactory {
    settings: ResponsesAgentSettings,
}

impl ResponsesAgentFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new(settings: ResponsesAgentSettings) -> Self {
        Self { settings }
    }
}

impl AgentFactory for ResponsesAgentFactory {
    fn build(
        &self,
        credentials: &AgentCredentials,
        instructions: &str,
    ) -> Result<Arc<dyn AgentRuntime>, InsightflowError> {
        let agent = ResponsesAgent::new(self.settings.clone(), credentials, instructions)?;
        Ok(Arc::new(agent))
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, PartialEq, Eq)]
struct FunctionCall {
    call_id: String,
    name: String,
}

fn tool_definitions(credentials: &AgentCredentials, web_search: bool) -> Vec<Value> {
    let mut tools = vec![
        json!({
            "type": "mcp",
            "server_label": "supabase",
            "server_url": credentials.mcp_server_url(),
            "authorization": credentials.supabase_access_token.expose_secret(),
            "require_approval": "never",
        }),
        json!({
            "type": "function",
            "name": CURRENT_TIME_TOOL,
            "description": "Returns the current local time in ISO-8601 format.",
            "parameters": {"type": "object", "properties": {}, "additionalProperties": false},
        }),
    ];
    if web_search {
        tools.push(json!({"type": "web_search"}));
    }
    tools
}

fn function_calls(output: &[Value]) -> Vec<FunctionCall> {
    output
        .iter()
        .filter(|item| item["type"] == "function_call")
        .filter_map(|item| {
            Some(FunctionCall {
                call_id: item["call_id"].as_str()?.to_string(),
                name: item["name"].as_str()?.to_string(),
            })
        })
        .collect()
}

fn output_text(output: &[Value]) -> String {
    output
        .iter()
        .filter(|item| item["type"] == "message")
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter(|part| part["type"] == "output_text")
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("")
}

fn run_local_tool(name: &str) -> String {
    match name {
        CURRENT_TIME_TOOL => chrono::Local::now().to_rfc3339(),
        other => json!({"error": format!("unknown tool: {other}")}).to_string(),
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
