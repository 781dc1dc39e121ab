//! Per-segment customer analysis with failure isolation.
//!
//! Segments run strictly one at a time, in input order, against the single
//! shared conversation. Running them concurrently would interleave appends to
//! the conversation and let a prompt resolve "the previous market" to the
//! wrong turn.
//!
//! Raw segment text is written as soon as its call returns, so a run cancelled
//! halfway still leaves the finished segments on disk.

use crate::cancellation::CancellationToken;
use crate::context::ConversationContext;
use crate::core::{CustomerAnalysis, ErrorRecord, Segment, SegmentAnalysis, StageKind};
use crate::errors::{AgentInvocationError, InsightflowError, SchemaParseError};
use crate::persistence::ArtifactStore;
use crate::stages::{StepExecutor, StructuredResponseParser};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What happened to one segment.
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    /// The step succeeded and its output parsed.
    Analyzed(CustomerAnalysis),
    /// The step succeeded but its output was not a JSON object.
    ParseFailed(SchemaParseError),
    /// The agent call itself failed.
    InvocationFailed(AgentInvocationError),
}

impl SegmentOutcome {
    /// Returns true if the segment was analyzed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Analyzed(_))
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Analyzed(_) => None,
            Self::ParseFailed(err) => Some(err.to_string()),
            Self::InvocationFailed(err) => Some(err.to_string()),
        }
    }

    /// Converts to the value stored on the integrated segment.
    #[must_use]
    pub fn to_analysis(&self) -> SegmentAnalysis {
        match self {
            Self::Analyzed(analysis) => SegmentAnalysis::Completed(analysis.clone()),
            Self::ParseFailed(err) => SegmentAnalysis::Failed(ErrorRecord::failed(err.to_string())),
            Self::InvocationFailed(err) => {
                SegmentAnalysis::Failed(ErrorRecord::failed(err.to_string()))
            }
        }
    }
}

/// The fan-out result for one segment.
#[derive(Debug, Clone)]
pub struct SegmentResult {
    /// The segment name the prompt was built from.
    pub market_name: String,
    /// The per-segment outcome.
    pub outcome: SegmentOutcome,
    /// Raw agent text when the call returned, even if it failed to parse.
    pub raw_text: Option<String>,
}

/// Counts of segment outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutSummary {
    /// Number of segments attempted.
    pub total: usize,
    /// Number analyzed successfully.
    pub succeeded: usize,
    /// Number recorded as failed.
    pub failed: usize,
}

impl FanoutSummary {
    /// Tallies a result list.
    #[must_use]
    pub fn from_results(results: &[SegmentResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.outcome.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Runs one customer analysis step per segment.
#[derive(Debug, Clone)]
pub struct SegmentFanoutController {
    executor: StepExecutor,
}

impl SegmentFanoutController {
    /// Creates a controller.
    #[must_use]
    pub fn new(executor: StepExecutor) -> Self {
        Self { executor }
    }

    /// Analyzes every segment in order.
    ///
    /// Returns exactly one result per input segment, in input order. A failed
    /// call or unparsable output becomes that segment's result; it never
    /// stops the loop. Only cancellation, checked before each segment, ends
    /// the fan-out early. With a `store`, each returned text is written before
    /// the next segment starts, and a write failure ends the fan-out.
    pub async fn run<F>(
        &self,
        ctx: &mut ConversationContext,
        segments: &[Segment],
        prompt_for: F,
        mut store: Option<&mut ArtifactStore>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SegmentResult>, InsightflowError>
    where
        F: Fn(&str) -> String,
    {
        let total = segments.len();
        let mut results = Vec::with_capacity(total);

        for (idx, segment) in segments.iter().enumerate() {
            cancel.check()?;

            let market_name = segment.market_name.clone();
            info!(
                event_name = "pipeline.segment.start",
                position = idx + 1,
                total,
                market_name = %market_name,
                "analyzing segment"
            );

            let prompt = prompt_for(&market_name);
            let result = match self.executor.execute(ctx, StageKind::Customer, &prompt).await {
                Ok(step) => {
                    if let Some(store) = store.as_deref_mut() {
                        store.write_customer_analysis(&market_name, &step.raw_text).await?;
                    }
                    let parsed =
                        StructuredResponseParser::parse_as_customer_analysis(&step.raw_text);
                    let outcome = match parsed {
                        Ok(analysis) => SegmentOutcome::Analyzed(analysis),
                        Err(err) => SegmentOutcome::ParseFailed(err),
                    };
                    SegmentResult {
                        market_name,
                        outcome,
                        raw_text: Some(step.raw_text),
                    }
                }
                Err(err) => SegmentResult {
                    market_name,
                    outcome: SegmentOutcome::InvocationFailed(err),
                    raw_text: None,
                },
            };

            if let Some(error) = result.outcome.error_message() {
                warn!(
                    event_name = "pipeline.segment.failed",
                    market_name = %result.market_name,
                    error = %error,
                    "segment analysis failed; continuing"
                );
            }
            results.push(result);
        }

        Ok(results)
    }
}
