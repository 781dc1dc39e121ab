//! Final output envelopes with analysis metadata.

use super::MarketDocument;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which variant of the final document an output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// The market document exactly as the market stage produced it.
    MarketAnalysisOnly,
    /// The market document with a customer analysis on every segment.
    IntegratedMarketAndCustomer,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketAnalysisOnly => write!(f, "market_analysis_only"),
            Self::IntegratedMarketAndCustomer => write!(f, "integrated_market_and_customer"),
        }
    }
}

/// A single point in time rendered in both metadata formats.
///
/// Captured once per run so every artifact and both output documents carry
/// the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStamp {
    /// Compact `YYYYMMDDHHMMSS` form, also used in artifact file names.
    pub timestamp: String,
    /// ISO-8601 form.
    pub date: String,
}

impl AnalysisStamp {
    /// Captures the current local time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    /// Renders a given instant.
    #[must_use]
    pub fn at(instant: DateTime<Local>) -> Self {
        Self {
            timestamp: instant.format("%Y%m%d%H%M%S").to_string(),
            date: instant.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        }
    }
}

/// Metadata attached to each final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// The document variant.
    pub analysis_type: AnalysisType,
    /// Compact timestamp of the run.
    pub analysis_timestamp: String,
    /// ISO-8601 date of the run.
    pub analysis_date: String,
}

impl AnalysisMetadata {
    /// Creates metadata for a variant from a run stamp.
    #[must_use]
    pub fn new(analysis_type: AnalysisType, stamp: &AnalysisStamp) -> Self {
        Self {
            analysis_type,
            analysis_timestamp: stamp.timestamp.clone(),
            analysis_date: stamp.date.clone(),
        }
    }
}

/// A final document: metadata plus the markets payload.
///
/// `M` is [`MarketDocument`] for owned outputs and `&MarketDocument` for the
/// pure output, which borrows the untouched market document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput<M = MarketDocument> {
    /// Run metadata.
    pub metadata: AnalysisMetadata,
    /// The market document, integrated or not.
    pub markets: M,
}

impl<M> PipelineOutput<M> {
    /// Wraps a payload with metadata.
    #[must_use]
    pub fn new(analysis_type: AnalysisType, stamp: &AnalysisStamp, markets: M) -> Self {
        Self {
            metadata: AnalysisMetadata::new(analysis_type, stamp),
            markets,
        }
    }
}
