//! Market and customer analysis documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed customer analysis for one segment. Any JSON object is accepted.
pub type CustomerAnalysis = Map<String, Value>;

/// The integrated document has the same structure as the market document,
/// with `customer_analysis` filled in on each segment.
pub type IntegratedDocument = MarketDocument;

/// Marker status carried by an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    /// The customer analysis for the segment failed.
    #[default]
    Failed,
}

/// Stands in for a customer analysis whose step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorRecord {
    /// The failure message.
    pub error: String,
    /// Always `failed`.
    pub status: FailureStatus,
}

impl ErrorRecord {
    /// Creates a failed record with the given message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: FailureStatus::Failed,
        }
    }
}

/// The value stored under a segment's `customer_analysis` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentAnalysis {
    /// The analysis step failed for this segment.
    Failed(ErrorRecord),
    /// The parsed analysis.
    Completed(CustomerAnalysis),
}

impl SegmentAnalysis {
    /// Returns true if this is an error record.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the analysis object, if the step succeeded.
    #[must_use]
    pub fn as_completed(&self) -> Option<&CustomerAnalysis> {
        match self {
            Self::Completed(analysis) => Some(analysis),
            Self::Failed(_) => None,
        }
    }
}

/// One market unit discovered by the market stage.
///
/// Serialized key order is `market_name`, then the remaining fields in the
/// order the model produced them, then `customer_analysis` when set. A
/// `market_name` the model listed later is still written first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment name; the join key between stages.
    pub market_name: String,
    /// Every other field the model produced, in original order.
    ///
    /// A `customer_analysis` key in market stage output lands here as plain
    /// data and is replaced when the segment is merged.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    /// Present only on integrated documents.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub customer_analysis: Option<SegmentAnalysis>,
}

impl Segment {
    /// Creates a segment with only a name.
    #[must_use]
    pub fn new(market_name: impl Into<String>) -> Self {
        Self {
            market_name: market_name.into(),
            attributes: Map::new(),
            customer_analysis: None,
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// The document produced by the market stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDocument {
    /// Segments in the order the model listed them.
    pub market_segments: Vec<Segment>,
    /// Top-level fields other than `market_segments`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarketDocument {
    /// Creates a document from segments.
    #[must_use]
    pub fn new(market_segments: Vec<Segment>) -> Self {
        Self {
            market_segments,
            extra: Map::new(),
        }
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.market_segments.len()
    }

    /// Returns true if there are no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.market_segments.is_empty()
    }

    /// Returns segment names in document order.
    #[must_use]
    pub fn segment_names(&self) -> Vec<&str> {
        self.market_segments
            .iter()
            .map(|s| s.market_name.as_str())
            .collect()
    }

    /// Finds the first segment whose name matches exactly.
    pub fn find_segment_mut(&mut self, market_name: &str) -> Option<&mut Segment> {
        self.market_segments
            .iter_mut()
            .find(|s| s.market_name == market_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_segment_keeps_extra_fields() {
        let segment: Segment = serde_json::from_value(json!({
            "market_name": "EdTech",
            "tam": "10B",
            "growth": 0.12
        }))
        .unwrap();

        assert_eq!(segment.market_name, "EdTech");
        assert_eq!(segment.attributes.get("tam"), Some(&json!("10B")));
        assert!(segment.customer_analysis.is_none());
    }

    #[test]
    fn test_segment_serializes_without_analysis() {
        let segment = Segment::new("FinTech").with_attribute("tam", json!("5B"));
        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(value, json!({"market_name": "FinTech", "tam": "5B"}));
    }

    #[test]
    fn test_customer_analysis_serializes_last() {
        let mut segment = Segment::new("EdTech").with_attribute("tam", json!("1B"));
        segment.customer_analysis = Some(SegmentAnalysis::Completed(
            json!({"size": "1B"}).as_object().cloned().unwrap(),
        ));

        let text = serde_json::to_string(&segment).unwrap();
        assert_eq!(
            text,
            r#"{"market_name":"EdTech","tam":"1B","customer_analysis":{"size":"1B"}}"#
        );
    }

    #[test]
    fn test_incoming_customer_analysis_is_plain_attribute() {
        let segment: Segment = serde_json::from_value(json!({
            "market_name": "EdTech",
            "customer_analysis": "pending"
        }))
        .unwrap();

        assert!(segment.customer_analysis.is_none());
        assert_eq!(segment.attributes.get("customer_analysis"), Some(&json!("pending")));
    }

    #[test]
    fn test_market_name_written_first_other_keys_keep_order() {
        let segment: Segment = serde_json::from_str(
            r#"{"tam":"1B","market_name":"EdTech","cagr":0.1,"buyers":["schools"]}"#,
        )
        .unwrap();

        assert_eq!(
            serde_json::to_string(&segment).unwrap(),
            r#"{"market_name":"EdTech","tam":"1B","cagr":0.1,"buyers":["schools"]}"#
        );
    }

    #[test]
    fn test_error_record_shape() {
        let record = ErrorRecord::failed("timeout");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"error": "timeout", "status": "failed"})
        );
    }

    #[test]
    fn test_analysis_with_error_like_fields_stays_completed() {
        let analysis: SegmentAnalysis = serde_json::from_value(json!({
            "error": "none",
            "status": "failed",
            "personas": []
        }))
        .unwrap();
        assert!(!analysis.is_failed());
    }

    #[test]
    fn test_document_keeps_top_level_fields() {
        let doc: MarketDocument = serde_json::from_value(json!({
            "summary": "two markets",
            "market_segments": [{"market_name": "A"}, {"market_name": "B"}]
        }))
        .unwrap();

        assert_eq!(doc.segment_names(), vec!["A", "B"]);
        assert_eq!(doc.extra.get("summary"), Some(&json!("two markets")));
    }

    #[test]
    fn test_find_segment_is_case_sensitive() {
        let mut doc = MarketDocument::new(vec![Segment::new("EdTech")]);
        assert!(doc.find_segment_mut("EdTech").is_some());
        assert!(doc.find_segment_mut("edtech").is_none());
    }
}
