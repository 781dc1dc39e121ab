//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Stage kinds
//! - Market documents, segments and per-segment analyses
//! - Output envelopes and their metadata

mod document;
mod output;
mod status;

pub use document::{
    CustomerAnalysis, ErrorRecord, FailureStatus, IntegratedDocument, MarketDocument, Segment,
    SegmentAnalysis,
};
pub use output::{AnalysisMetadata, AnalysisStamp, AnalysisType, PipelineOutput};
pub use status::StageKind;
