//! Strict JSON parsing of stage output.

use crate::core::{CustomerAnalysis, MarketDocument, StageKind};
use crate::errors::SchemaParseError;
use serde_json::Value;
use tracing::warn;

/// Parses raw agent text into the shapes the pipeline consumes.
///
/// Only two things are checked: the text is valid JSON, and the one field the
/// pipeline dereferences downstream is present with the right type. Every
/// other field is carried through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredResponseParser;

impl StructuredResponseParser {
    /// Parses market stage output.
    ///
    /// Requires a top-level object with a `market_segments` array of objects.
    /// An entry without a string `market_name` is named `market_<n>` after its
    /// 1-based position, so one unnamed segment never costs the others.
    pub fn parse_as_market_document(text: &str) -> Result<MarketDocument, SchemaParseError> {
        let stage = StageKind::Market;
        let mut value = parse_json(text, stage)?;

        match value.get_mut("market_segments") {
            Some(Value::Array(segments)) => name_unnamed_segments(segments),
            Some(other) => {
                return Err(SchemaParseError::new(format!(
                    "`market_segments` must be an array, got {}",
                    type_name(other)
                ))
                .with_stage(stage)
                .with_excerpt(text));
            }
            None => {
                return Err(SchemaParseError::new("missing `market_segments` sequence")
                    .with_stage(stage)
                    .with_excerpt(text));
            }
        }

        serde_json::from_value(value).map_err(|e| {
            SchemaParseError::new(format!("segment shape mismatch: {e}"))
                .with_stage(stage)
                .with_excerpt(text)
        })
    }

    /// Parses customer stage output. Any JSON object is accepted.
    pub fn parse_as_customer_analysis(text: &str) -> Result<CustomerAnalysis, SchemaParseError> {
        let stage = StageKind::Customer;
        match parse_json(text, stage)? {
            Value::Object(map) => Ok(map),
            other => Err(SchemaParseError::new(format!(
                "customer analysis must be a JSON object, got {}",
                type_name(&other)
            ))
            .with_stage(stage)
            .with_excerpt(text)),
        }
    }
}

fn name_unnamed_segments(segments: &mut [Value]) {
    for (idx, entry) in segments.iter_mut().enumerate() {
        let Value::Object(fields) = entry else {
            continue;
        };
        if matches!(fields.get("market_name"), Some(Value::String(_))) {
            continue;
        }

        let fallback = format!("market_{}", idx + 1);
        warn!(
            event_name = "pipeline.market.unnamed_segment",
            position = idx + 1,
            found = fields.get("market_name").map_or("nothing", type_name),
            fallback = %fallback,
            "segment has no string market_name; using its position"
        );
        fields.insert("market_name".to_string(), Value::String(fallback));
    }
}

fn parse_json(text: &str, stage: StageKind) -> Result<Value, SchemaParseError> {
    serde_json::from_str(text).map_err(|e| {
        SchemaParseError::new(format!("response is not valid JSON: {e}"))
            .with_stage(stage)
            .with_excerpt(text)
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_document_parses() {
        let doc = StructuredResponseParser::parse_as_market_document(
            r#"{"market_segments":[{"market_name":"EdTech","tam":"10B"},
                {"market_name":"FinTech"}]}"#,
        )
        .unwrap();

        assert_eq!(doc.segment_names(), vec!["EdTech", "FinTech"]);
        assert_eq!(doc.market_segments[0].attributes.get("tam"), Some(&json!("10B")));
    }

    #[test]
    fn test_market_document_rejects_invalid_json() {
        let err = StructuredResponseParser::parse_as_market_document("Here are the markets: ...")
            .unwrap_err();
        assert_eq!(err.stage, Some(StageKind::Market));
        assert!(err.message.contains("not valid JSON"));
        assert_eq!(err.excerpt, "Here are the markets: ...");
    }

    #[test]
    fn test_market_document_requires_segments() {
        let err = StructuredResponseParser::parse_as_market_document(r#"{"markets": []}"#)
            .unwrap_err();
        assert!(err.message.contains("missing `market_segments`"));
    }

    #[test]
    fn test_market_document_rejects_non_array_segments() {
        let err = StructuredResponseParser::parse_as_market_document(r#"{"market_segments": {}}"#)
            .unwrap_err();
        assert!(err.message.contains("must be an array, got object"));
    }

    #[test]
    fn test_unnamed_segments_get_positional_names() {
        let doc = StructuredResponseParser::parse_as_market_document(
            r#"{"market_segments": [
                {"market_name": "EdTech"},
                {"tam": "1B"},
                {"market_name": 42},
                {"market_name": null}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.segment_names(), vec!["EdTech", "market_2", "market_3", "market_4"]);
        assert_eq!(doc.market_segments[1].attributes.get("tam"), Some(&json!("1B")));
    }

    #[test]
    fn test_non_object_segment_is_rejected() {
        let err = StructuredResponseParser::parse_as_market_document(
            r#"{"market_segments": ["EdTech"]}"#,
        )
        .unwrap_err();
        assert!(err.message.contains("segment shape mismatch"));
    }

    #[test]
    fn test_empty_segment_list_is_valid() {
        let doc = StructuredResponseParser::parse_as_market_document(r#"{"market_segments": []}"#)
            .unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_customer_analysis_parses_object() {
        let analysis =
            StructuredResponseParser::parse_as_customer_analysis(r#"{"size": "1B"}"#).unwrap();
        assert_eq!(analysis.get("size"), Some(&json!("1B")));
    }

    #[test]
    fn test_customer_analysis_rejects_non_object() {
        let err = StructuredResponseParser::parse_as_customer_analysis("[1, 2]").unwrap_err();
        assert_eq!(err.stage, Some(StageKind::Customer));
        assert!(err.message.contains("got array"));
    }
}
