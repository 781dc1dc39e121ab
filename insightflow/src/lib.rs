//! # Insightflow
//!
//! A sequential analysis pipeline that drives a conversational agent through a
//! fixed set of steps and merges the results into a single document.
//!
//! The pipeline runs four stages against one shared conversation:
//!
//! - **Schema**: the agent describes the database schema it can reach
//! - **Market**: the agent produces a JSON document of market segments
//! - **Customer**: one customer analysis per segment, isolated per segment
//! - **Persist**: the pure and integrated documents are written to disk
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use insightflow::prelude::*;
//!
//! let orchestrator = PipelineOrchestrator::new(runtime, prompts, PipelineOptions::default());
//! let run = orchestrator.run(&RunRequest::default(), &CancellationToken::new()).await?;
//!
//! println!("{}", serde_json::to_string_pretty(&run.integrated)?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agent;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod persistence;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{AgentCredentials, AgentResponse, AgentRuntime};
    #[cfg(feature = "responses-agent")]
    pub use crate::agent::{ResponsesAgent, ResponsesAgentSettings};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{AppConfig, LoadOptions};
    pub use crate::context::{ConversationContext, SessionMode, Turn};
    pub use crate::core::{
        AnalysisMetadata, AnalysisStamp, AnalysisType, CustomerAnalysis, ErrorRecord,
        IntegratedDocument, MarketDocument, PipelineOutput, Segment, SegmentAnalysis, StageKind,
    };
    pub use crate::errors::{
        AgentInvocationError, InsightflowError, MissingCredentialsError, SchemaParseError,
    };
    pub use crate::persistence::ArtifactStore;
    pub use crate::pipeline::{
        FanoutSummary, IntegratedMergeBuilder, MergedOutputs, PipelineOptions,
        PipelineOrchestrator, PipelineRun, PromptSet, RunRequest, SegmentFanoutController,
        SegmentOutcome, SegmentResult,
    };
    pub use crate::stages::{StepExecutor, StepResult, StructuredResponseParser};
}
