//! Builds the pure and integrated output documents.

use super::SegmentResult;
use crate::core::{
    AnalysisStamp, AnalysisType, IntegratedDocument, MarketDocument, PipelineOutput, Segment,
    SegmentAnalysis,
};
use tracing::warn;

/// Both final documents of a run.
#[derive(Debug, Clone)]
pub struct MergedOutputs<'a> {
    /// The market document untouched, borrowed from the caller.
    pub pure: PipelineOutput<&'a MarketDocument>,
    /// An independent copy annotated with per-segment analyses.
    pub integrated: PipelineOutput<IntegratedDocument>,
}

/// Merges fan-out results into a copy of the market document.
#[derive(Debug, Clone)]
pub struct IntegratedMergeBuilder {
    stamp: AnalysisStamp,
}

impl IntegratedMergeBuilder {
    /// Creates a builder; both outputs will carry `stamp`.
    #[must_use]
    pub fn new(stamp: AnalysisStamp) -> Self {
        Self { stamp }
    }

    /// Returns the run stamp.
    #[must_use]
    pub fn stamp(&self) -> &AnalysisStamp {
        &self.stamp
    }

    /// Builds both outputs. `market_document` is never modified.
    #[must_use]
    pub fn build<'a>(
        &self,
        market_document: &'a MarketDocument,
        results: &[SegmentResult],
    ) -> MergedOutputs<'a> {
        let mut integrated = market_document.clone();
        for result in results {
            merge_segment(&mut integrated, &result.market_name, result.outcome.to_analysis());
        }

        MergedOutputs {
            pure: PipelineOutput::new(
                AnalysisType::MarketAnalysisOnly,
                &self.stamp,
                market_document,
            ),
            integrated: PipelineOutput::new(
                AnalysisType::IntegratedMarketAndCustomer,
                &self.stamp,
                integrated,
            ),
        }
    }
}

/// Sets `customer_analysis` on the segment named `market_name`.
///
/// Among same-named segments the first one still without an analysis wins, so
/// duplicate names each receive their own result. Any `customer_analysis` the
/// market stage left among the attributes is overwritten. When no segment
/// matches, a minimal segment is appended so the result is never dropped.
/// Returns false in that case.
pub fn merge_segment(
    document: &mut IntegratedDocument,
    market_name: &str,
    analysis: SegmentAnalysis,
) -> bool {
    let segments = &mut document.market_segments;
    let position = segments
        .iter()
        .position(|s| s.market_name == market_name && s.customer_analysis.is_none())
        .or_else(|| segments.iter().position(|s| s.market_name == market_name));

    match position {
        Some(idx) => {
            let segment = &mut segments[idx];
            segment.attributes.shift_remove("customer_analysis");
            segment.customer_analysis = Some(analysis);
            true
        }
        None => {
            warn!(
                event_name = "pipeline.merge.appended",
                market_name = %market_name,
                "no segment matched; appending a new one"
            );
            let mut segment = Segment::new(market_name);
            segment.customer_analysis = Some(analysis);
            segments.push(segment);
            false
        }
    }
}
