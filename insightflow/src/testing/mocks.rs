//! Scripted agent runtime for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::agent::{AgentCredentials, AgentFactory, AgentResponse, AgentRuntime};
use crate::context::Message;
use crate::errors::{AgentInvocationError, InsightflowError};

/// What the scripted runtime answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Successful text.
    Text(String),
    /// An invocation error with this message.
    Fail(String),
}

impl ScriptedReply {
    fn to_result(&self) -> Result<AgentResponse, AgentInvocationError> {
        match self {
            Self::Text(text) => Ok(AgentResponse::text(text.clone())),
            Self::Fail(message) => Err(AgentInvocationError::new(message.clone())),
        }
    }
}

/// One observed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The prompt as sent.
    pub prompt: String,
    /// Number of history messages, or `None` for a detached call.
    pub history_len: Option<usize>,
}

/// An agent runtime that answers by prompt substring.
///
/// Rules are checked in insertion order and the first whose needle occurs in
/// the prompt wins. Unmatched prompts get the fallback reply.
#[derive(Debug)]
pub struct ScriptedAgentRuntime {
    rules: Vec<(String, ScriptedReply)>,
    fallback: ScriptedReply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedAgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgentRuntime {
    /// Creates a runtime whose fallback reply is an empty JSON object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: ScriptedReply::Text("{}".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` when the prompt contains `needle`.
    #[must_use]
    pub fn on(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), ScriptedReply::Text(text.into())));
        self
    }

    /// Fails with `message` when the prompt contains `needle`.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), ScriptedReply::Fail(message.into())));
        self
    }

    /// Sets the reply for prompts no rule matches.
    #[must_use]
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Returns every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the prompts so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.prompt.clone()).collect()
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn reply_for(&self, prompt: &str) -> &ScriptedReply {
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map_or(&self.fallback, |(_, reply)| reply)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgentRuntime {
    async fn invoke(
        &self,
        history: Option<Vec<Message>>,
        prompt: &str,
    ) -> Result<AgentResponse, AgentInvocationError> {
        self.calls.lock().push(RecordedCall {
            prompt: prompt.to_string(),
            history_len: history.as_ref().map(Vec::len),
        });
        self.reply_for(prompt).to_result()
    }
}

/// An agent factory that hands out one shared scripted runtime.
#[derive(Debug)]
pub struct ScriptedAgentFactory {
    runtime: Arc<ScriptedAgentRuntime>,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedAgentFactory {
    /// Creates a factory over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<ScriptedAgentRuntime>) -> Self {
        Self {
            runtime,
            instructions: Mutex::new(Vec::new()),
        }
    }

    /// Returns the runtime shared by every build.
    #[must_use]
    pub fn runtime(&self) -> Arc<ScriptedAgentRuntime> {
        self.runtime.clone()
    }

    /// Returns the system instructions passed to each build.
    #[must_use]
    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().clone()
    }
}

impl AgentFactory for ScriptedAgentFactory {
    fn build(
        &self,
        credentials: &AgentCredentials,
        instructions: &str,
    ) -> Result<Arc<dyn AgentRuntime>, InsightflowError> {
        credentials.validate()?;
        self.instructions.lock().push(instructions.to_string());
        Ok(self.runtime.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runtime = ScriptedAgentRuntime::new()
            .on("market", "first")
            .on("market analysis", "second");

        let response = runtime.invoke(None, "run the market analysis").await.unwrap();
        assert_eq!(response.content, "first");
    }

    #[tokio::test]
    async fn test_fallback_and_failures() {
        let runtime = ScriptedAgentRuntime::new()
            .fail_on("boom", "quota exceeded")
            .with_fallback(ScriptedReply::Text("plain".to_string()));

        assert_eq!(runtime.invoke(None, "hello").await.unwrap().content, "plain");
        let err = runtime.invoke(None, "boom").await.unwrap_err();
        assert_eq!(err.message, "quota exceeded");
    }

    #[tokio::test]
    async fn test_records_history_length() {
        let runtime = ScriptedAgentRuntime::new();
        runtime.invoke(None, "a").await.unwrap();
        runtime
            .invoke(Some(vec![Message::user("a"), Message::assistant("{}")]), "b")
            .await
            .unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                RecordedCall { prompt: "a".to_string(), history_len: None },
                RecordedCall { prompt: "b".to_string(), history_len: Some(2) },
            ]
        );
        assert_eq!(runtime.call_count(), 2);
    }

    #[test]
    fn test_factory_validates_credentials() {
        let factory = ScriptedAgentFactory::new(Arc::new(ScriptedAgentRuntime::new()));

        let Err(err) = factory.build(&AgentCredentials::new("", ""), "sys") else {
            panic!("blank credentials must be rejected");
        };
        assert_eq!(err.kind(), "missing_credentials_error");
        assert!(factory.instructions().is_empty());

        factory.build(&AgentCredentials::new("p", "t"), "sys").unwrap();
        assert_eq!(factory.instructions(), vec!["sys".to_string()]);
    }
}
