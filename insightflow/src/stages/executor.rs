//! Single agent invocation against the shared conversation.

use crate::agent::AgentRuntime;
use crate::context::ConversationContext;
use crate::core::StageKind;
use crate::errors::AgentInvocationError;
use std::sync::Arc;
use tracing::{debug, info};

/// The unprocessed output of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// The stage that produced it.
    pub stage: StageKind,
    /// The agent's final text.
    pub raw_text: String,
}

/// Invokes the agent runtime once per call.
///
/// Failures are returned, never swallowed: the caller decides whether a
/// failed step is fatal or isolated.
#[derive(Clone)]
pub struct StepExecutor {
    runtime: Arc<dyn AgentRuntime>,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor").finish_non_exhaustive()
    }
}

impl StepExecutor {
    /// Creates an executor over a runtime.
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// Runs one prompt and appends the exchange to `ctx` on success.
    ///
    /// A failed call leaves `ctx` untouched.
    pub async fn execute(
        &self,
        ctx: &mut ConversationContext,
        stage: StageKind,
        prompt: &str,
    ) -> Result<StepResult, AgentInvocationError> {
        debug!(
            event_name = "pipeline.step.invoke",
            stage = %stage,
            session_id = %ctx.session_id(),
            prior_turns = ctx.len(),
            prompt_chars = prompt.len(),
            "invoking agent"
        );

        let response = self
            .runtime
            .invoke(ctx.history(), prompt)
            .await
            .map_err(|e| e.with_stage(stage))?;

        ctx.record(stage, prompt, response.content.as_str());

        info!(
            event_name = "pipeline.step.complete",
            stage = %stage,
            model = %response.model,
            total_tokens = response.total_tokens(),
            latency_ms = response.latency_ms.unwrap_or_default(),
            output_chars = response.content.len(),
            "agent step completed"
        );

        Ok(StepResult {
            stage,
            raw_text: response.content,
        })
    }
}
