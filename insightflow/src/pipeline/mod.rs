//! Pipeline orchestration.
//!
//! - [`PipelineOrchestrator`] sequences the four stages
//! - [`SegmentFanoutController`] runs the isolated per-segment steps
//! - [`IntegratedMergeBuilder`] produces the pure and integrated documents
//! - [`PromptComposer`] builds each stage's prompt

mod fanout;
mod merge;
mod orchestrator;
mod prompts;

#[cfg(test)]
mod integration_tests;

pub use fanout::{FanoutSummary, SegmentFanoutController, SegmentOutcome, SegmentResult};
pub use merge::{merge_segment, IntegratedMergeBuilder, MergedOutputs};
pub use orchestrator::{PipelineOptions, PipelineOrchestrator, PipelineRun, RunRequest};
pub use prompts::{
    PromptComposer, PromptPaths, PromptSet, BUSINESS_EXPERT_FILE, CUSTOMER_ANALYSIS_FILE,
    MARKET_ANALYSIS_FILE, MARKET_NAME_PLACEHOLDER, SCHEMA_INSTRUCTION, SCHEMA_LOCK,
};
