//! The four-stage analysis pipeline.

use super::{
    FanoutSummary, IntegratedMergeBuilder, MergedOutputs, PromptComposer, PromptSet,
    SegmentFanoutController,
};
use crate::agent::AgentRuntime;
use crate::cancellation::CancellationToken;
use crate::context::{ConversationContext, SessionMode};
use crate::core::{AnalysisStamp, IntegratedDocument, PipelineOutput, StageKind};
use crate::errors::InsightflowError;
use crate::persistence::ArtifactStore;
use crate::stages::{StepExecutor, StructuredResponseParser};
use crate::utils::{generate_run_id, timestamps::elapsed_ms, Timestamp};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Settings shared by every run of an orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Whether calls see the accumulated dialogue.
    pub session_mode: SessionMode,
    /// Parent of the default `outputs_<timestamp>` directory.
    pub output_base_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            session_mode: SessionMode::Shared,
            output_base_dir: PathBuf::from("."),
        }
    }
}

/// Per-run inputs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Session owner; labels the conversation.
    pub session_label: String,
    /// Free text injected into every stage prompt.
    pub user_feedback: Option<String>,
    /// Whether artifacts are written.
    pub save_files: bool,
    /// Overrides the default output directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            session_label: "huimin".to_string(),
            user_feedback: None,
            save_files: true,
            output_dir: None,
        }
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The run identifier.
    pub run_id: Uuid,
    /// The primary result.
    pub integrated: PipelineOutput<IntegratedDocument>,
    /// The market document without customer analyses.
    pub pure: PipelineOutput,
    /// Segment outcome counts.
    pub summary: FanoutSummary,
    /// Paths written, in write order. Empty when saving is off.
    pub artifacts: Vec<PathBuf>,
    /// Number of agent turns in the conversation.
    pub turns: usize,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
}

impl PipelineRun {
    /// Total wall time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        elapsed_ms(self.started_at, self.finished_at)
    }
}

/// Sequences the schema, market, customer and persist stages.
///
/// Schema and market failures abort the run. Customer failures are recorded
/// per segment and the run completes.
pub struct PipelineOrchestrator {
    executor: StepExecutor,
    prompts: PromptSet,
    options: PipelineOptions,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over an agent runtime.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        prompts: PromptSet,
        options: PipelineOptions,
    ) -> Self {
        Self {
            executor: StepExecutor::new(runtime),
            prompts,
            options,
        }
    }

    /// Runs the whole pipeline once.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, InsightflowError> {
        let run_id = generate_run_id();
        let span = info_span!("pipeline.run", %run_id, session = %request.session_label);

        async {
            let result = self.run_stages(run_id, request, cancel).await;
            match &result {
                Ok(run) => info!(
                    event_name = "pipeline.run.complete",
                    segments = run.summary.total,
                    failed_segments = run.summary.failed,
                    duration_ms = run.duration_ms(),
                    "pipeline run completed"
                ),
                Err(err) => error!(
                    event_name = "pipeline.run.failed",
                    error_kind = err.kind(),
                    error = %err,
                    "pipeline run aborted"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, InsightflowError> {
        let started_at = Utc::now();
        let stamp = AnalysisStamp::now();
        let composer = PromptComposer::new(&self.prompts, request.user_feedback.as_deref());

        let mut store = if request.save_files {
            let dir = request.output_dir.clone().unwrap_or_else(|| {
                ArtifactStore::default_dir(&self.options.output_base_dir, &stamp)
            });
            Some(ArtifactStore::create(dir, &stamp).await?)
        } else {
            None
        };

        let mut ctx = ConversationContext::new(&request.session_label, self.options.session_mode);

        // Stage 1: schema description. Kept only as conversation context.
        stage_started(StageKind::Schema);
        cancel.check()?;
        let schema = self
            .executor
            .execute(&mut ctx, StageKind::Schema, &composer.schema_prompt())
            .await?;
        if let Some(store) = store.as_mut() {
            store.write_schema_description(&schema.raw_text).await?;
        }
        stage_completed(StageKind::Schema);

        // Stage 2: market analysis. Must parse, or there is nothing to fan out.
        stage_started(StageKind::Market);
        cancel.check()?;
        let market = self
            .executor
            .execute(&mut ctx, StageKind::Market, &composer.market_prompt())
            .await?;
        if let Some(store) = store.as_mut() {
            store.write_market_analysis(&market.raw_text).await?;
        }
        let market_document = StructuredResponseParser::parse_as_market_document(&market.raw_text)?;
        info!(
            event_name = "pipeline.market.parsed",
            segments = market_document.len(),
            "market document parsed"
        );
        stage_completed(StageKind::Market);

        // Stage 3: customer analysis, one isolated step per segment.
        stage_started(StageKind::Customer);
        let fanout = SegmentFanoutController::new(self.executor.clone());
        let results = fanout
            .run(
                &mut ctx,
                &market_document.market_segments,
                |name| composer.customer_prompt(name),
                store.as_mut(),
                cancel,
            )
            .await?;
        stage_completed(StageKind::Customer);

        // Stage 4: merge and persist.
        stage_started(StageKind::Persist);
        let MergedOutputs { pure, integrated } =
            IntegratedMergeBuilder::new(stamp).build(&market_document, &results);
        if let Some(store) = store.as_mut() {
            store.write_pure_output(&pure).await?;
            store.write_integrated_output(&integrated).await?;
        }
        stage_completed(StageKind::Persist);
        let pure_metadata = pure.metadata;

        Ok(PipelineRun {
            run_id,
            integrated,
            pure: PipelineOutput {
                metadata: pure_metadata,
                markets: market_document,
            },
            summary: FanoutSummary::from_results(&results),
            artifacts: store.map(ArtifactStore::into_written).unwrap_or_default(),
            turns: ctx.len(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

fn stage_started(stage: StageKind) {
    info!(event_name = "pipeline.stage.start", stage = %stage, "stage started");
}

fn stage_completed(stage: StageKind) {
    info!(event_name = "pipeline.stage.complete", stage = %stage, "stage completed");
}
